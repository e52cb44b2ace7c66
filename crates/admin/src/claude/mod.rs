//! Claude API integration for SEO copy generation.
//!
//! Jobs depend on the [`TextGenerator`] trait rather than on
//! [`ClaudeClient`] directly so that tests can substitute a canned generator.

mod client;
mod error;
mod types;

use async_trait::async_trait;

pub use client::ClaudeClient;
pub use error::ClaudeError;
pub use types::{ChatRequest, ChatResponse, ContentBlock, Message, StopReason, Usage};

/// Anything that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the generation backend fails.
    async fn generate(&self, prompt: &str) -> Result<String, ClaudeError>;
}
