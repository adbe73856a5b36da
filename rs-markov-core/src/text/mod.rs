//! Text handling for the Markov chain.
//!
//! - `Token`: words, punctuation runs and the two sentence sentinels
//! - `TokenizerConfig`: sentence splitting, tokenization, detokenization
//!   and the canonical form used for novelty checks

/// Token type, including the reserved sentence sentinels.
pub mod token;

/// Sentence splitting and (de)tokenization rules.
pub mod tokenizer;
