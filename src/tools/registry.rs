use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::types::{Tool, ToolDescriptor};

/// Characters a function name may not contain
static INVALID_NAME_CHARS: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"[^A-Za-z0-9_-]").unwrap());

const MAX_NAME_LEN: usize = 64;

/// Name under which a server tool is offered to the model
pub fn qualified_name(server: &str, tool: &str) -> String {
    let mut name = INVALID_NAME_CHARS
        .replace_all(&format!("{}_{}", server, tool), "_")
        .into_owned();
    name.truncate(MAX_NAME_LEN);
    name
}

/// Where a model-facing tool name really lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRoute {
    pub server: String,
    pub tool: String,
}

/// Function definitions offered to the model, plus the route back to each server tool
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    routes: HashMap<String, ToolRoute>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server tool and return the name it is exposed under
    pub fn register(&mut self, descriptor: &ToolDescriptor) -> String {
        let base = qualified_name(&descriptor.server, &descriptor.name);
        let mut name = base.clone();
        let mut n = 2;
        while self.routes.contains_key(&name) {
            let suffix = format!("_{}", n);
            let keep = base.len().min(MAX_NAME_LEN - suffix.len());
            name = format!("{}{}", &base[..keep], suffix);
            n += 1;
        }

        let parameters = if descriptor.input_schema.is_object() {
            descriptor.input_schema.clone()
        } else {
            serde_json::json!({ "type": "object", "properties": {} })
        };

        self.tools.push(Tool::function(
            name.clone(),
            descriptor.description.clone().unwrap_or_default(),
            parameters,
        ));
        self.routes.insert(
            name.clone(),
            ToolRoute {
                server: descriptor.server.clone(),
                tool: descriptor.name.clone(),
            },
        );
        name
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn resolve(&self, name: &str) -> Option<&ToolRoute> {
        self.routes.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(server: &str, name: &str) -> ToolDescriptor {
        ToolDescriptor {
            server: server.to_string(),
            name: name.to_string(),
            description: Some(format!("{} tool", name)),
            input_schema: json!({"type": "object", "properties": {"url": {"type": "string"}}}),
        }
    }

    #[test]
    fn names_are_namespaced_and_sanitized() {
        assert_eq!(
            qualified_name("puppeteer", "puppeteer_navigate"),
            "puppeteer_puppeteer_navigate"
        );
        assert_eq!(qualified_name("my.server", "take screenshot"), "my_server_take_screenshot");
        assert_eq!(qualified_name("s", &"x".repeat(100)).len(), 64);
    }

    #[test]
    fn resolves_back_to_server_tool() {
        let mut registry = ToolRegistry::new();
        let name = registry.register(&descriptor("puppeteer", "puppeteer_click"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.tools()[0].function.name, name);
        assert_eq!(registry.tools()[0].function.description, "puppeteer_click tool");
        assert_eq!(
            registry.resolve(&name),
            Some(&ToolRoute {
                server: "puppeteer".to_string(),
                tool: "puppeteer_click".to_string(),
            })
        );
        assert!(registry.resolve("puppeteer_click").is_none());
    }

    #[test]
    fn colliding_names_get_a_suffix() {
        let mut registry = ToolRegistry::new();
        let first = registry.register(&descriptor("a.b", "go"));
        let second = registry.register(&descriptor("a_b", "go"));

        assert_eq!(first, "a_b_go");
        assert_eq!(second, "a_b_go_2");
        assert_eq!(registry.resolve(&second).unwrap().server, "a_b");
    }

    #[test]
    fn missing_schema_becomes_empty_object() {
        let mut registry = ToolRegistry::new();
        registry.register(&ToolDescriptor {
            server: "s".to_string(),
            name: "t".to_string(),
            description: None,
            input_schema: serde_json::Value::Null,
        });

        let function = &registry.tools()[0].function;
        assert_eq!(function.parameters["type"], "object");
        assert_eq!(function.description, "");
    }
}
