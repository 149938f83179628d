use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    /// Arguments as a JSON object. Providers send either an object or an
    /// encoded JSON string; an empty string means no arguments.
    pub fn arguments_object(&self) -> Result<Map<String, Value>> {
        let value = match &self.arguments {
            Value::String(raw) if raw.trim().is_empty() => return Ok(Map::new()),
            Value::String(raw) => serde_json::from_str(raw)
                .with_context(|| format!("arguments are not valid JSON: {}", raw))?,
            Value::Null => return Ok(Map::new()),
            other => other.clone(),
        };

        match value {
            Value::Object(map) => Ok(map),
            other => Err(anyhow::anyhow!("arguments must be a JSON object, got {}", other)),
        }
    }

    /// Store the arguments as an encoded JSON string, the form the
    /// chat-completions API accepts when the call is sent back
    pub fn encode_arguments(&mut self) {
        self.arguments = match &self.arguments {
            Value::String(_) => return,
            Value::Null => Value::String("{}".to_string()),
            other => Value::String(other.to_string()),
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

impl Tool {
    pub fn function(name: String, description: String, parameters: Value) -> Self {
        Tool {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name,
                description,
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    pub function: FunctionCall,
}

/// A tool as advertised by an automation server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub server: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}
