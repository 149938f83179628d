use anyhow::{bail, Context, Result};
use std::sync::Arc;

use crate::config::AgentConfig;
use crate::tools::{Connection, ToolExecutor, ToolRegistry};
use crate::types::{Tool, ToolCall, ToolDescriptor};

/// Persona plus the servers an agent is allowed to use
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    pub name: String,
    pub instruction: String,
    pub server_names: Vec<String>,
}

impl AgentDefinition {
    pub fn from_config(config: &AgentConfig) -> Self {
        AgentDefinition {
            name: config.name.clone(),
            instruction: config.instruction.clone(),
            server_names: config.server_names.clone(),
        }
    }
}

/// An agent bound to a live connection, with its tools loaded
pub struct Agent {
    definition: AgentDefinition,
    tool_executor: ToolExecutor,
}

impl Agent {
    /// Checks that every server the agent names is reachable and loads their tools
    pub async fn bind(definition: AgentDefinition, connection: Arc<dyn Connection>) -> Result<Self> {
        if definition.server_names.is_empty() {
            bail!("agent '{}' names no servers", definition.name);
        }

        let available = connection.servers();
        let mut registry = ToolRegistry::new();

        for server in &definition.server_names {
            if !available.contains(server) {
                bail!(
                    "agent '{}' needs server '{}', but only [{}] are connected",
                    definition.name,
                    server,
                    available.join(", ")
                );
            }

            let tools = connection
                .list_tools(server)
                .await
                .with_context(|| format!("failed to list tools of '{}'", server))?;
            for tool in &tools {
                registry.register(tool);
            }
        }

        Ok(Agent {
            definition,
            tool_executor: ToolExecutor::new(connection, registry),
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn instruction(&self) -> &str {
        &self.definition.instruction
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    /// Function definitions offered to the model
    pub fn tools(&self) -> &[Tool] {
        self.tool_executor.get_tools()
    }

    /// Ask each server for its current tool list
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let connection = self.tool_executor.connection();
        let mut all = Vec::new();
        for server in &self.definition.server_names {
            all.extend(connection.list_tools(server).await?);
        }
        Ok(all)
    }

    pub async fn execute_tool_calls(&self, tool_calls: &[ToolCall]) -> Vec<(String, String)> {
        self.tool_executor.execute_all(tool_calls).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::FunctionCall;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::Mutex;

    /// In-memory connection exposing a fixed tool set
    pub(crate) struct FakeConnection {
        pub servers: Vec<String>,
        pub calls: Mutex<Vec<(String, String, Map<String, Value>)>>,
    }

    impl FakeConnection {
        pub(crate) fn new(servers: &[&str]) -> Arc<Self> {
            Arc::new(FakeConnection {
                servers: servers.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Connection for FakeConnection {
        fn servers(&self) -> Vec<String> {
            self.servers.clone()
        }

        async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>> {
            Ok(vec![
                ToolDescriptor {
                    server: server.to_string(),
                    name: "navigate".to_string(),
                    description: Some("Navigate to a URL".to_string()),
                    input_schema: json!({"type": "object", "properties": {"url": {"type": "string"}}}),
                },
                ToolDescriptor {
                    server: server.to_string(),
                    name: "fail".to_string(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                },
            ])
        }

        async fn call_tool(&self, server: &str, tool: &str, arguments: Map<String, Value>) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((server.to_string(), tool.to_string(), arguments.clone()));
            match tool {
                "fail" => bail!("element not found"),
                _ => Ok(format!(
                    "navigated to {}",
                    arguments.get("url").and_then(Value::as_str).unwrap_or("?")
                )),
            }
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn definition(servers: &[&str]) -> AgentDefinition {
        AgentDefinition {
            name: "browser".to_string(),
            instruction: "browse".to_string(),
            server_names: servers.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            tool_type: Some("function".to_string()),
            function: FunctionCall {
                name: name.to_string(),
                index: None,
                arguments: Value::String(arguments.to_string()),
            },
        }
    }

    #[tokio::test]
    async fn bind_loads_namespaced_tools() {
        let connection = FakeConnection::new(&["puppeteer"]);
        let agent = Agent::bind(definition(&["puppeteer"]), connection).await.unwrap();

        let names: Vec<&str> = agent.tools().iter().map(|t| t.function.name.as_str()).collect();
        assert_eq!(names, vec!["puppeteer_navigate", "puppeteer_fail"]);
        assert_eq!(agent.list_tools().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn bind_rejects_unknown_server() {
        let connection = FakeConnection::new(&["puppeteer"]);
        let err = Agent::bind(definition(&["playwright"]), connection)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("playwright"));
    }

    #[tokio::test]
    async fn tool_calls_route_to_server_and_errors_become_text() {
        let connection = FakeConnection::new(&["puppeteer"]);
        let agent = Agent::bind(definition(&["puppeteer"]), connection.clone())
            .await
            .unwrap();

        let results = agent
            .execute_tool_calls(&[
                tool_call("c1", "puppeteer_navigate", r#"{"url":"https://example.com"}"#),
                tool_call("c2", "puppeteer_fail", "{}"),
                tool_call("c3", "nope", "{}"),
            ])
            .await;

        assert_eq!(results[0], ("c1".to_string(), "navigated to https://example.com".to_string()));
        assert!(results[1].1.starts_with("Tool error:"));
        assert!(results[1].1.contains("element not found"));
        assert!(results[2].1.contains("unknown tool: nope"));

        let calls = connection.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "puppeteer");
        assert_eq!(calls[0].1, "navigate");
    }
}
