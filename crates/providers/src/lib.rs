//! Language-model provider implementations for twinsearch.
//!
//! All providers implement the `twinsearch_core::Provider` trait.
//! [`build_from_config`] selects the backend named in the configuration.

pub mod builder;
pub mod openai_compat;

pub use builder::build_from_config;
pub use openai_compat::OpenAiCompatProvider;
