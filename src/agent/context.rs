use crate::types::{Message, ToolCall};

/// Conversation history plus the system prompt it is replayed under
#[derive(Debug, Clone)]
pub struct Context {
    system_prompt: String,
    messages: Vec<Message>,
}

impl Context {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Context {
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
        }
    }

    pub fn add_user(&mut self, content: &str) {
        self.messages.push(Message::user(content));
    }

    pub fn add_assistant(&mut self, content: &str, mut tool_calls: Option<Vec<ToolCall>>) {
        for call in tool_calls.iter_mut().flatten() {
            call.function.encode_arguments();
        }
        self.messages.push(Message::assistant(content, tool_calls));
    }

    pub fn add_tool_result(&mut self, tool_call_id: &str, content: &str) {
        self.messages.push(Message::tool(tool_call_id, content));
    }

    /// Full transcript, system prompt first
    pub fn messages(&self) -> Vec<Message> {
        let mut all = Vec::with_capacity(self.messages.len() + 1);
        all.push(Message::system(&self.system_prompt));
        all.extend(self.messages.iter().cloned());
        all
    }

    /// History without the system prompt
    pub fn raw_messages(&self) -> &[Message] {
        &self.messages
    }

    /// A context with the same system prompt and no history
    pub fn fresh(&self) -> Self {
        Context::new(self.system_prompt.clone())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
