//! The automation environment: servers that expose browser tools.

pub mod executor;
pub mod mcp;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::types::ToolDescriptor;

pub use executor::ToolExecutor;
pub use mcp::McpEnvironment;
pub use registry::{ToolRegistry, ToolRoute};

/// Opens connections to the automation environment
#[async_trait]
pub trait AutomationEnvironment: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Connection>>;
}

/// A live connection to one or more named tool servers
#[async_trait]
pub trait Connection: Send + Sync {
    /// Names of the servers reachable through this connection
    fn servers(&self) -> Vec<String>;

    async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>>;

    /// Invoke `tool` on `server`, returning its textual output
    async fn call_tool(&self, server: &str, tool: &str, arguments: Map<String, Value>) -> Result<String>;

    async fn close(&self) -> Result<()>;
}
