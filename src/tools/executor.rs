use anyhow::{Context, Result};
use std::sync::Arc;

use crate::types::{Tool, ToolCall};

use super::registry::ToolRegistry;
use super::Connection;

/// Runs model-issued tool calls against the connection
pub struct ToolExecutor {
    connection: Arc<dyn Connection>,
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(connection: Arc<dyn Connection>, registry: ToolRegistry) -> Self {
        ToolExecutor {
            connection,
            registry,
        }
    }

    pub fn get_tools(&self) -> &[Tool] {
        self.registry.tools()
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub async fn execute(&self, tool_call: &ToolCall) -> Result<String> {
        let name = &tool_call.function.name;
        let route = self
            .registry
            .resolve(name)
            .with_context(|| format!("unknown tool: {}", name))?;
        let args = tool_call
            .function
            .arguments_object()
            .with_context(|| format!("invalid arguments for {}", name))?;

        log::info!("🔧 {} -> {}/{}", name, route.server, route.tool);
        log::debug!("arguments: {:?}", args);

        self.connection
            .call_tool(&route.server, &route.tool, args)
            .await
            .with_context(|| format!("{} failed", name))
    }

    /// Execute every call; failures become text the model can read and react to
    pub async fn execute_all(&self, tool_calls: &[ToolCall]) -> Vec<(String, String)> {
        let mut results = Vec::with_capacity(tool_calls.len());

        for tool_call in tool_calls {
            let result = match self.execute(tool_call).await {
                Ok(output) => {
                    log::debug!("✅ {}: {} bytes", tool_call.function.name, output.len());
                    output
                }
                Err(e) => {
                    let error_msg = format!("Tool error: {:#}", e);
                    log::warn!("❌ {}", error_msg);
                    error_msg
                }
            };
            results.push((tool_call.id.clone(), result));
        }

        results
    }
}
