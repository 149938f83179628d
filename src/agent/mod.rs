pub mod context;
pub mod core;
pub mod engine;
pub mod llm;
pub mod session;

pub use context::Context;
pub use core::{Agent, AgentDefinition};
pub use engine::{AugmentedLlm, Engine, OpenAiEngine, ReasoningEngine, RequestParams};
pub use llm::{ChatModel, LlmClient};
pub use session::{Collaborators, SessionManager, SessionMetadata, SessionPhase, SessionRegistry};
