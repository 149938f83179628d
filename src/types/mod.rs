mod chat;
mod command;
mod function;

pub use chat::{ApiError, ChatRequest, ChatResponse, Choice, Message};
pub use command::Command;
pub use function::{FunctionCall, FunctionDefinition, Tool, ToolCall, ToolDescriptor};
