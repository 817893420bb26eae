pub mod provider;
pub mod providers;
pub mod sse_parser;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use provider::LlmProvider;
pub use types::{CallConfig, ChatMessage, LlmResponse};
