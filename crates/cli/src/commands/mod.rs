//! Command handlers for the FeedMind CLI.

pub mod ask;
pub mod prompts;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use prompts::PromptsCommand;
