pub mod client;
pub mod error;
pub mod types;

pub use client::{ChatClient, CompletionSender};
pub use error::LlmError;
pub use types::{ChatMessage, ChatRequest, ResponseFormat};
