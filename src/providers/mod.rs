//! Providers module - Completion provider boundary
//!
//! The reasoning loop depends on [`CompletionProvider`] only. Concrete model
//! clients live outside this crate and are injected at construction; this
//! module supplies the payload parser and a [`RetryProvider`] decorator.

mod parser;
pub mod retry;
mod types;

pub use parser::{parse_response, ParsedResponse, Usage};
pub use retry::{CircuitState, RetryProvider};
pub use types::{ChatOptions, CompletionProvider};
