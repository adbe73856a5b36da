//! Error types for the corpus model and the generator.

/// Errors raised while building, merging or (de)serializing chains.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
	/// The chain order must be at least 1.
	#[error("invalid chain order ({order}), must be >= 1")]
	InvalidConfiguration {
		/// The rejected order.
		order: usize,
	},

	/// Two tables (or corpora) of different order were combined.
	#[error("order mismatch: expected {expected}, got {found}")]
	OrderMismatch {
		/// Order of the receiving table.
		expected: usize,
		/// Order of the table being merged in.
		found: usize,
	},

	/// A snapshot violates the table invariants.
	#[error("corrupt snapshot: {0}")]
	CorruptSnapshot(String),

	/// I/O error.
	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// Snapshot encoding error.
	#[error(transparent)]
	Codec(#[from] postcard::Error),
}

/// Errors returned by sentence generation.
///
/// All of them are recoverable: hosts usually answer with a static fallback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
	/// Nothing has been learned yet.
	#[error("the model is empty")]
	ModelEmpty,

	/// The constraints cannot be satisfied by construction.
	#[error("invalid constraints: {0}")]
	InvalidConstraints(String),

	/// Every attempt was rejected (replay, too short, missing word...).
	#[error("generation exhausted after {attempts} attempts")]
	GenerationExhausted {
		/// Number of attempts consumed.
		attempts: usize,
	},
}

/// Errors from the multi-source registry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
	/// No corpus is registered under that label.
	#[error("source {0} not found")]
	UnknownSource(String),

	/// Intensities must be finite and non-negative.
	#[error("invalid intensity {0}, must be finite and >= 0.0")]
	InvalidIntensity(f32),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
