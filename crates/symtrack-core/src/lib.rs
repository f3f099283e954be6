pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod tools;
pub mod workflow;

pub use config::{AppConfig, ModelPolicy};
pub use connection::{ChannelTransport, ClientConnection, NullTransport, StatusTransport};
pub use context::{ContextService, ConversationContext};
pub use error::DomainError;
pub use extract::ChatModel;
pub use orchestrator::HealthChatOrchestrator;
