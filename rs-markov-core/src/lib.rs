//! Word-level Markov chain text generation library.
//!
//! This crate provides an incrementally trained sentence generator:
//! - A tokenizer turning raw chat text into sentinel-bounded token sequences
//! - Fixed-order transition tables with mergeable observation counts
//! - A corpus model owning a table plus the set of training sentences
//! - A weighted random-walk generator with novelty and length constraints
//! - A registry of named corpora (one per channel or topic)
//!
//! The model never performs I/O by itself; the [`io`] module offers
//! snapshot persistence helpers for hosts that want them.

/// Error types shared by every module.
pub mod errors;

/// Sentence splitting, tokenization and detokenization.
pub mod text;

/// Transition tables, corpus models and the generator.
pub mod model;

/// Snapshot persistence and file helpers.
pub mod io;

pub use errors::{ChainError, ChainResult, GenerationError, RegistryError};
pub use model::constraints::{Constraints, StartState};
pub use model::corpus::{CorpusConfig, CorpusModel, LearningFilter};
pub use model::generator::Generation;
pub use model::registry::CorpusRegistry;
pub use model::shared::SharedCorpus;
pub use model::source_weights::SourceWeights;
pub use text::token::Token;
pub use text::tokenizer::TokenizerConfig;
