//! MCP servers launched as child processes and spoken to over stdio.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{Peer, RoleClient, RunningService};
use rmcp::transport::TokioChildProcess;
use rmcp::ServiceExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::types::ToolDescriptor;

use super::{AutomationEnvironment, Connection};

/// Launches every configured server on connect
pub struct McpEnvironment {
    servers: BTreeMap<String, ServerConfig>,
}

impl McpEnvironment {
    pub fn new(servers: BTreeMap<String, ServerConfig>) -> Self {
        McpEnvironment { servers }
    }
}

#[async_trait]
impl AutomationEnvironment for McpEnvironment {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        if self.servers.is_empty() {
            bail!("no MCP servers configured");
        }

        let mut clients = BTreeMap::new();
        for (name, config) in &self.servers {
            match McpClient::spawn(name, config).await {
                Ok(client) => {
                    clients.insert(name.clone(), client);
                }
                Err(e) => {
                    for (started, client) in clients {
                        if let Err(close_err) = client.close().await {
                            log::warn!("failed to stop MCP server '{}': {:#}", started, close_err);
                        }
                    }
                    return Err(e.context(format!("failed to start MCP server '{}'", name)));
                }
            }
        }

        Ok(Arc::new(McpConnection { clients }))
    }
}

struct McpClient {
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpClient {
    async fn spawn(name: &str, config: &ServerConfig) -> Result<Self> {
        log::info!("starting MCP server '{}': {} {}", name, config.command, config.args.join(" "));

        let mut command = Command::new(&config.command);
        command.args(&config.args).envs(&config.env);

        let transport = TokioChildProcess::new(command)
            .with_context(|| format!("failed to launch `{}`", config.command))?;
        let service = ()
            .serve(transport)
            .await
            .context("MCP handshake failed")?;

        Ok(McpClient {
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        })
    }

    async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>> {
        let tools = self.peer.list_all_tools().await?;

        tools
            .iter()
            .map(|tool| -> Result<ToolDescriptor> {
                let raw = serde_json::to_value(tool)?;
                Ok(ToolDescriptor {
                    server: server.to_string(),
                    name: raw
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| anyhow!("tool without a name"))?
                        .to_string(),
                    description: raw
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    input_schema: raw.get("inputSchema").cloned().unwrap_or(Value::Null),
                })
            })
            .collect()
    }

    async fn call_tool(&self, tool: &str, arguments: Map<String, Value>) -> Result<String> {
        let params: CallToolRequestParam = serde_json::from_value(serde_json::json!({
            "name": tool,
            "arguments": arguments,
        }))?;
        let result = self.peer.call_tool(params).await?;

        render_result(&serde_json::to_value(&result)?)
    }

    async fn close(&self) -> Result<()> {
        if let Some(service) = self.service.lock().await.take() {
            service.cancel().await?;
        }
        Ok(())
    }
}

/// Flatten a `CallToolResult` into text; an `isError` result becomes an error
fn render_result(result: &Value) -> Result<String> {
    let mut parts = Vec::new();

    if let Some(content) = result.get("content").and_then(Value::as_array) {
        for item in content {
            match item.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = item.get("text").and_then(Value::as_str) {
                        parts.push(text.to_string());
                    }
                }
                Some("image") => {
                    let mime = item
                        .get("mimeType")
                        .and_then(Value::as_str)
                        .unwrap_or("image");
                    parts.push(format!("[{} attached]", mime));
                }
                Some("resource") => {
                    let uri = item
                        .pointer("/resource/uri")
                        .and_then(Value::as_str)
                        .unwrap_or("resource");
                    parts.push(format!("[resource {}]", uri));
                }
                _ => {}
            }
        }
    }

    if parts.is_empty() {
        if let Some(structured) = result.get("structuredContent") {
            parts.push(structured.to_string());
        }
    }

    let text = parts.join("\n");
    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        bail!("{}", if text.is_empty() { "tool reported an error" } else { text.as_str() });
    }

    Ok(text)
}

struct McpConnection {
    clients: BTreeMap<String, McpClient>,
}

impl McpConnection {
    fn client(&self, server: &str) -> Result<&McpClient> {
        self.clients
            .get(server)
            .ok_or_else(|| anyhow!("server '{}' is not connected", server))
    }
}

#[async_trait]
impl Connection for McpConnection {
    fn servers(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>> {
        self.client(server)?.list_tools(server).await
    }

    async fn call_tool(&self, server: &str, tool: &str, arguments: Map<String, Value>) -> Result<String> {
        self.client(server)?.call_tool(tool, arguments).await
    }

    async fn close(&self) -> Result<()> {
        for (name, client) in &self.clients {
            if let Err(e) = client.close().await {
                log::warn!("failed to stop MCP server '{}': {:#}", name, e);
            }
        }
        Ok(())
    }
}
