use crate::errors::GenerationError;

/// Strategy used to select the starting context of a generation.
///
/// # Variants
/// - `Sentinel`: start at the sentence-start context (all `Begin`).
/// - `Words(String)`: the sentence must start with these words; shorter
///   seeds are padded with `Begin`, longer ones keep their last `order` tokens.
/// - `Random`: start from a random context of the table (may begin
///   mid-sentence).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StartState {
	#[default]
	Sentinel,
	Words(String),
	Random,
}

/// Input parameters for a generation.
///
/// # Responsibilities
/// - Bound the retry budget (`max_attempts`)
/// - Bound the output length (`min_tokens..=max_tokens`, sentinels excluded)
/// - Select the starting context and optional content filters
///
/// # Invariants (checked by `validate`)
/// - `max_attempts >= 1`
/// - `1 <= min_tokens <= max_tokens`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraints {
	/// Number of candidates to draw before giving up.
	pub max_attempts: usize,

	/// Hard cap on generated tokens; longer walks are truncated.
	pub max_tokens: usize,

	/// Candidates shorter than this are rejected.
	pub min_tokens: usize,

	/// Starting context.
	pub start: StartState,

	/// Word the output must contain (case-insensitive).
	pub must_contain: Option<String>,

	/// Reject candidates that replay a training sentence verbatim.
	pub reject_replay: bool,

	/// Reject candidates cut by `max_tokens` instead of returning them flagged.
	pub reject_truncated: bool,
}

impl Default for Constraints {
	fn default() -> Self {
		Self {
			max_attempts: 10,
			max_tokens: 64,
			min_tokens: 1,
			start: StartState::Sentinel,
			must_contain: None,
			reject_replay: true,
			reject_truncated: false,
		}
	}
}

impl Constraints {
	/// Checks the invariants.
	///
	/// # Errors
	/// Returns `InvalidConstraints` describing the first violation.
	pub fn validate(&self) -> Result<(), GenerationError> {
		if self.max_attempts == 0 {
			return Err(GenerationError::InvalidConstraints(
				"max_attempts must be >= 1".to_owned(),
			));
		}
		if self.min_tokens == 0 || self.max_tokens == 0 {
			return Err(GenerationError::InvalidConstraints(
				"min_tokens and max_tokens must be >= 1".to_owned(),
			));
		}
		if self.min_tokens > self.max_tokens {
			return Err(GenerationError::InvalidConstraints(format!(
				"min_tokens ({}) > max_tokens ({})",
				self.min_tokens, self.max_tokens
			)));
		}
		Ok(())
	}

	/// Sets both length bounds at once.
	///
	/// # Errors
	/// Returns `InvalidConstraints` (and leaves `self` untouched) if the
	/// bounds are invalid.
	pub fn set_bounds(&mut self, min_tokens: usize, max_tokens: usize) -> Result<(), GenerationError> {
		let candidate = Self {
			min_tokens,
			max_tokens,
			..self.clone()
		};
		candidate.validate()?;
		*self = candidate;
		Ok(())
	}

	/// Returns a copy starting with the given words.
	pub fn starting_with(mut self, words: impl Into<String>) -> Self {
		self.start = StartState::Words(words.into());
		self
	}

	/// Returns a copy that must contain `word`.
	pub fn containing(mut self, word: impl Into<String>) -> Self {
		self.must_contain = Some(word.into());
		self
	}
}
