pub mod agent;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod tools;
pub mod types;

pub use agent::{Agent, Collaborators, SessionManager, SessionPhase, SessionRegistry};
pub use config::{AgentConfig, Config, LlmConfig, ServerConfig, SessionConfig};
pub use credentials::{Credential, CredentialSource};
pub use error::{AgentError, InitError, InitStage};
pub use cli::run_cli;
