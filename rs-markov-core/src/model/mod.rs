//! Top-level module for the Markov chain model.
//!
//! This module provides the word-level chain and everything built on it:
//! - Fixed-order transition tables (`TransitionTable`)
//! - Per-context transition counts (`State`)
//! - Corpus models owning a table and their training sentences (`CorpusModel`)
//! - Generation constraints (`Constraints`) and the random walk (`generator`)
//! - Multi-source aggregation (`CorpusRegistry`, `SourceWeights`)

/// Weighted random walk over a corpus model, with novelty checks.
pub mod generator;

/// Generation constraints: retry budget, length bounds, start state.
pub mod constraints;

/// Corpus model: transition table, training sentences and ingestion.
pub mod corpus;

/// Fixed-order transition table (`order >= 1`).
///
/// Handles sequence ingestion, transition counting and table merging.
pub mod transition_table;

/// Outgoing transitions of a single context.
///
/// Tracks observation counts and supports weighted random sampling.
pub mod state;

/// Plain, encoding-agnostic representation of a corpus model.
pub mod snapshot;

/// Named corpus models (one per channel or topic).
pub mod registry;

/// Per-source selection intensities, normalized into probabilities.
pub mod source_weights;

/// Reader/writer-locked corpus for hosts ingesting and generating concurrently.
pub mod shared;
