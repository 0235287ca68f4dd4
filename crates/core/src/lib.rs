//! # twinsearch core
//!
//! Domain types, traits, and error definitions for the twinsearch agent.
//! Every other crate in the workspace depends inward on this one.
//!
//! The seams are traits:
//! - [`Provider`] for the language-generation backend
//! - [`SearchProvider`] for the web-search backends
//! - [`Tool`] for model-callable capabilities
//!
//! so the turn loop can be driven end to end with scripted mocks.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod search;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use search::{SearchHit, SearchProvider, SearchReport, SearchStatus};
pub use tool::{Bookkeeper, Tool, ToolCall, ToolRegistry, ToolResult};
