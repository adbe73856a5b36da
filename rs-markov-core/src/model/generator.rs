use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use rand::Rng;

use super::constraints::{Constraints, StartState};
use super::corpus::CorpusModel;
use super::transition_table::TransitionTable;
use crate::errors::GenerationError;
use crate::text::token::Token;
use crate::text::tokenizer::TokenizerConfig;

/// A generated sentence and how it was obtained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
	text: String,
	tokens: Vec<Token>,
	truncated: bool,
	attempts: usize,
}

impl Generation {
	/// The detokenized sentence.
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Consumes the generation, keeping the sentence.
	pub fn into_text(self) -> String {
		self.text
	}

	/// Generated tokens, sentinels excluded.
	pub fn tokens(&self) -> &[Token] {
		&self.tokens
	}

	/// Number of generated tokens (seed words included).
	pub fn token_count(&self) -> usize {
		self.tokens.len()
	}

	/// True if the walk hit `max_tokens` before the sentence-end sentinel.
	pub fn is_truncated(&self) -> bool {
		self.truncated
	}

	/// Number of candidates drawn, the accepted one included.
	pub fn attempts(&self) -> usize {
		self.attempts
	}
}

impl fmt::Display for Generation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.text)
	}
}

/// Raw output of one random walk.
struct Walk {
	tokens: Vec<Token>,
	truncated: bool,
	/// Tokens drawn from the table (seed words excluded).
	drawn: usize,
}

/// Generates a novel sentence from a corpus model.
///
/// # Behavior
/// - Validates `constraints`, then fails fast on an empty model.
/// - Draws up to `max_attempts` candidates by random walk.
/// - Rejects candidates that are too short, that lack `must_contain`,
///   that were truncated (if `reject_truncated`), that add nothing to their
///   seed words, or that replay a training sentence (if `reject_replay`).
/// - Returns the first accepted candidate.
///
/// # Errors
/// - `InvalidConstraints` if the constraints are inconsistent, if the
///   seed words alone exceed `max_tokens`, or if `must_contain` is not a
///   single word.
/// - `ModelEmpty` if nothing was learned.
/// - `GenerationExhausted` if every attempt was rejected.
///
/// # Notes
/// - Fully determined by `rng`: a seeded generator reproduces the output.
/// - Never mutates the model.
pub fn generate<R: Rng + ?Sized>(
	model: &CorpusModel,
	constraints: &Constraints,
	rng: &mut R,
) -> Result<Generation, GenerationError> {
	constraints.validate()?;
	if model.is_empty() {
		return Err(GenerationError::ModelEmpty);
	}

	let tokenizer = &model.config().tokenizer;
	let seed: Vec<Token> = match &constraints.start {
		StartState::Words(words) => tokenizer
			.tokenize(words)
			.into_iter()
			.filter(|token| !token.is_sentinel())
			.collect(),
		_ => Vec::new(),
	};
	if seed.len() > constraints.max_tokens {
		return Err(GenerationError::InvalidConstraints(format!(
			"{} seed tokens exceed max_tokens ({})",
			seed.len(),
			constraints.max_tokens
		)));
	}
	let needle = match constraints.must_contain.as_deref() {
		Some(word) => Some(single_word(tokenizer, word)?),
		None => None,
	};

	for attempt in 1..=constraints.max_attempts {
		let walk = match &constraints.start {
			StartState::Random => random_start_walk(model.table(), constraints.max_tokens, rng),
			_ => walk_from(model.table(), seed.clone(), constraints.max_tokens, rng),
		};

		if walk.tokens.len() < constraints.min_tokens {
			log::debug!("Attempt {}: too short ({} tokens)", attempt, walk.tokens.len());
			continue;
		}
		if walk.truncated && constraints.reject_truncated {
			log::debug!("Attempt {}: truncated", attempt);
			continue;
		}
		if !seed.is_empty() && walk.drawn == 0 {
			log::debug!("Attempt {}: seed words lead nowhere", attempt);
			continue;
		}
		if let Some(needle) = &needle {
			let found = walk
				.tokens
				.iter()
				.filter_map(Token::as_str)
				.any(|word| word.to_lowercase() == *needle);
			if !found {
				log::debug!("Attempt {}: missing {:?}", attempt, needle);
				continue;
			}
		}

		let text = tokenizer.detokenize(&walk.tokens);
		if constraints.reject_replay && model.contains_sentence(&text) {
			log::debug!("Attempt {}: replays a training sentence", attempt);
			continue;
		}

		return Ok(Generation {
			text,
			tokens: walk.tokens,
			truncated: walk.truncated,
			attempts: attempt,
		});
	}

	Err(GenerationError::GenerationExhausted {
		attempts: constraints.max_attempts,
	})
}

/// Generates `amount` sentences, skipping failed draws.
///
/// May return fewer than `amount` sentences (or none) if the model cannot
/// satisfy the constraints.
pub fn generate_many<R: Rng + ?Sized>(
	model: &CorpusModel,
	constraints: &Constraints,
	amount: usize,
	rng: &mut R,
) -> Vec<String> {
	(0..amount)
		.filter_map(|_| generate(model, constraints, rng).ok())
		.map(Generation::into_text)
		.collect()
}

/// Builds pools of pre-generated sentences, one pool per seed word.
///
/// Each pool holds sentences containing (case-insensitively) its seed word.
pub fn generate_for_seed_words<R: Rng + ?Sized>(
	model: &CorpusModel,
	constraints: &Constraints,
	seed_words: &[&str],
	amount: usize,
	rng: &mut R,
) -> BTreeMap<String, Vec<String>> {
	seed_words
		.iter()
		.map(|word| {
			let constraints = constraints.clone().containing(*word);
			(
				(*word).to_owned(),
				generate_many(model, &constraints, amount, rng),
			)
		})
		.collect()
}

/// Reduces `must_contain` to the one word token it must match.
///
/// # Errors
/// Returns `InvalidConstraints` unless `word` tokenizes to exactly one
/// non-punctuation token: generated tokens are compared one at a time, so
/// `"like dogs"` or `"dogs."` could never match.
fn single_word(tokenizer: &TokenizerConfig, word: &str) -> Result<String, GenerationError> {
	let tokens: Vec<Token> = tokenizer
		.tokenize(word)
		.into_iter()
		.filter(|token| !token.is_sentinel())
		.collect();
	match tokens.as_slice() {
		[token @ Token::Word(text)] if !token.is_punctuation() => Ok(text.to_lowercase()),
		_ => Err(GenerationError::InvalidConstraints(format!(
			"must_contain {word:?} is not a single word"
		))),
	}
}

/// Walks the table from a random context.
fn random_start_walk<R: Rng + ?Sized>(
	table: &TransitionTable,
	max_tokens: usize,
	rng: &mut R,
) -> Walk {
	let Some(key) = table.random_key(rng) else {
		return walk_from(table, Vec::new(), max_tokens, rng);
	};

	// The key is at most `order` tokens; keep the words within the cap
	let mut window: VecDeque<Token> = key.iter().cloned().collect();
	let mut tokens: Vec<Token> = key.iter().filter(|t| !t.is_sentinel()).cloned().collect();
	tokens.truncate(max_tokens);
	let start = tokens.len();

	let truncated = walk(table, &mut window, &mut tokens, max_tokens, rng);
	Walk {
		drawn: tokens.len() - start,
		tokens,
		truncated,
	}
}

/// Walks the table from the sentence start, forcing `seed` as first tokens.
fn walk_from<R: Rng + ?Sized>(
	table: &TransitionTable,
	seed: Vec<Token>,
	max_tokens: usize,
	rng: &mut R,
) -> Walk {
	let order = table.order();
	let mut window: VecDeque<Token> = table
		.start_key()
		.into_iter()
		.chain(seed.iter().cloned())
		.collect();
	while window.len() > order {
		window.pop_front();
	}

	let mut tokens = seed;
	let start = tokens.len();
	let truncated = walk(table, &mut window, &mut tokens, max_tokens, rng);
	Walk {
		drawn: tokens.len() - start,
		tokens,
		truncated,
	}
}

/// The random walk itself.
///
/// At each step the current context's distribution is sampled; the window
/// then drops its oldest token and appends the new one. An unknown context
/// behaves like the sentence-end sentinel.
///
/// Returns `true` if the walk stopped because `tokens` reached `max_tokens`.
fn walk<R: Rng + ?Sized>(
	table: &TransitionTable,
	window: &mut VecDeque<Token>,
	tokens: &mut Vec<Token>,
	max_tokens: usize,
	rng: &mut R,
) -> bool {
	loop {
		let next = match table.predict(window.make_contiguous(), rng) {
			Some(Token::End) | None => return false,
			Some(next) => next,
		};
		if tokens.len() >= max_tokens {
			return true;
		}

		tokens.push(next.clone());
		window.pop_front();
		window.push_back(next.clone());
	}
}
