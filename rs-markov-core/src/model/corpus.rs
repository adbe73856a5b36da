use std::collections::HashSet;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use rand::Rng;

use super::constraints::Constraints;
use super::generator::{self, Generation};
use super::transition_table::TransitionTable;
use crate::errors::{ChainError, ChainResult, GenerationError};
use crate::io::{build_output_path, load_snapshot, read_file, save_snapshot};
use crate::text::tokenizer::TokenizerConfig;

/// Default chain order.
pub const DEFAULT_ORDER: usize = 2;

/// Chunks per CPU when training in parallel.
const CHUNK_FACTOR: usize = 8;

/// Decides which incoming messages are worth learning.
///
/// Defaults mirror chat usage: bot commands (messages opening with
/// punctuation such as `!roll` or `/help`) and mentions (`@`) are skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LearningFilter {
	/// Skip messages whose first character is ASCII punctuation.
	pub skip_leading_punctuation: bool,

	/// Skip messages containing any of these substrings.
	pub blocked_substrings: Vec<String>,
}

impl Default for LearningFilter {
	fn default() -> Self {
		Self {
			skip_leading_punctuation: true,
			blocked_substrings: vec!["@".to_owned()],
		}
	}
}

impl LearningFilter {
	/// A filter accepting every message.
	pub fn permissive() -> Self {
		Self {
			skip_leading_punctuation: false,
			blocked_substrings: Vec::new(),
		}
	}

	/// True if `message` should be learned.
	pub fn accepts(&self, message: &str) -> bool {
		let message = message.trim_start();
		if message.is_empty() {
			return false;
		}
		if self.skip_leading_punctuation && message.starts_with(|c: char| c.is_ascii_punctuation()) {
			return false;
		}
		!self
			.blocked_substrings
			.iter()
			.any(|blocked| message.contains(blocked.as_str()))
	}
}

/// Configuration of a corpus model.
///
/// The order is validated once at construction and cannot change afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorpusConfig {
	order: usize,

	/// Tokenization rules.
	pub tokenizer: TokenizerConfig,

	/// Message filter applied before learning.
	pub filter: LearningFilter,
}

impl Default for CorpusConfig {
	fn default() -> Self {
		Self {
			order: DEFAULT_ORDER,
			tokenizer: TokenizerConfig::default(),
			filter: LearningFilter::default(),
		}
	}
}

impl CorpusConfig {
	/// Creates a configuration with the given order and default rules.
	///
	/// # Errors
	/// Returns `InvalidConfiguration` if `order == 0`.
	pub fn new(order: usize) -> ChainResult<Self> {
		if order == 0 {
			return Err(ChainError::InvalidConfiguration { order });
		}
		Ok(Self {
			order,
			..Self::default()
		})
	}

	/// Replaces the tokenizer rules.
	pub fn with_tokenizer(mut self, tokenizer: TokenizerConfig) -> Self {
		self.tokenizer = tokenizer;
		self
	}

	/// Replaces the learning filter.
	pub fn with_filter(mut self, filter: LearningFilter) -> Self {
		self.filter = filter;
		self
	}

	/// The chain order.
	pub fn order(&self) -> usize {
		self.order
	}
}

/// A Markov chain trained on a running corpus of messages.
///
/// This struct manages:
/// - `table`: the transition table, exclusively owned
/// - `sentences`: canonical forms of every learned sentence, used only to
///   reject verbatim replays after generation
/// - `sentence_count`: number of sentences ingested, duplicates included
///
/// Only `ingest`, `merge` and `reset` mutate a model. It is not meant for
/// concurrent mutation; see `SharedCorpus` for a locked wrapper.
#[derive(Clone, Debug)]
pub struct CorpusModel {
	config: CorpusConfig,
	table: TransitionTable,
	sentences: HashSet<String>,
	sentence_count: usize,
}

impl Default for CorpusModel {
	fn default() -> Self {
		Self::new(CorpusConfig::default())
	}
}

impl CorpusModel {
	/// Creates an empty model.
	pub fn new(config: CorpusConfig) -> Self {
		Self {
			table: empty_table(config.order),
			config,
			sentences: HashSet::new(),
			sentence_count: 0,
		}
	}

	/// Creates an empty model of order `order` with default rules.
	///
	/// # Errors
	/// Returns `InvalidConfiguration` if `order == 0`.
	pub fn with_order(order: usize) -> ChainResult<Self> {
		Ok(Self::new(CorpusConfig::new(order)?))
	}

	/// Learns a message.
	///
	/// # Behavior
	/// - Drops the message if the learning filter rejects it.
	/// - Splits it into sentences, tokenizes each one and merges the
	///   transitions into the table.
	/// - Records the canonical form of every non-empty sentence.
	///
	/// Never fails: empty or malformed text is a no-op.
	/// Returns the number of sentences learned.
	pub fn ingest(&mut self, text: &str) -> usize {
		if !self.config.filter.accepts(text) {
			return 0;
		}

		let tokenizer = &self.config.tokenizer;
		let mut learned = 0;
		for sentence in tokenizer.split_sentences(text) {
			let tokens = tokenizer.tokenize(&sentence);
			if tokens.is_empty() {
				continue;
			}
			self.table.add_sequence(&tokens);
			self.sentences.insert(tokenizer.canonicalize(&sentence));
			learned += 1;
		}
		self.sentence_count += learned;

		learned
	}

	/// Learns a batch of messages, each filtered on its own.
	///
	/// Returns the number of sentences learned.
	pub fn ingest_messages<I, S>(&mut self, messages: I) -> usize
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let learned: usize = messages
			.into_iter()
			.map(|message| self.ingest(message.as_ref()))
			.sum();
		log::debug!("Corpus updated with {} new sentences", learned);
		learned
	}

	/// True if `candidate` is, once canonicalized, a training sentence.
	pub fn contains_sentence(&self, candidate: &str) -> bool {
		self.sentences
			.contains(&self.config.tokenizer.canonicalize(candidate))
	}

	/// True if the table has no context (nothing learned yet).
	pub fn is_empty(&self) -> bool {
		self.table.is_empty()
	}

	/// Forgets everything: table, training sentences and counter.
	pub fn reset(&mut self) {
		self.table = empty_table(self.config.order);
		self.sentences.clear();
		self.sentence_count = 0;
	}

	/// Merges another model of the same order into this one.
	///
	/// # Errors
	/// Returns `OrderMismatch` if the orders differ; `self` is unchanged.
	pub fn merge(&mut self, other: &Self) -> ChainResult<()> {
		self.table.merge(&other.table)?;
		self.sentences.extend(other.sentences.iter().cloned());
		self.sentence_count += other.sentence_count;
		Ok(())
	}

	/// Trains a model from many messages using worker threads.
	///
	/// # Behavior
	/// - Splits the messages into chunks (based on CPU cores * factor).
	/// - Builds one partial model per chunk on its own thread.
	/// - Merges all partial models as they arrive.
	///
	/// Merging is commutative, so the result does not depend on which
	/// worker finishes first.
	pub fn from_lines_parallel<S>(lines: &[S], config: &CorpusConfig) -> ChainResult<Self>
	where
		S: AsRef<str> + Sync,
	{
		let mut final_model = Self::new(config.clone());
		if lines.is_empty() {
			return Ok(final_model);
		}

		let chunks = num_cpus::get() * CHUNK_FACTOR;
		let chunk_size = lines.len().div_ceil(chunks);

		let (tx, rx) = mpsc::channel();
		thread::scope(|scope| -> ChainResult<()> {
			for chunk in lines.chunks(chunk_size) {
				let tx = tx.clone();
				scope.spawn(move || {
					let mut partial_model = CorpusModel::new(config.clone());
					partial_model.ingest_messages(chunk);
					// The receiver outlives every worker inside the scope
					let _ = tx.send(partial_model);
				});
			}
			drop(tx);

			for partial_model in rx.iter() {
				final_model.merge(&partial_model)?;
			}
			Ok(())
		})?;

		log::info!(
			"Trained order-{} corpus from {} messages: {} sentences, {} contexts",
			config.order,
			lines.len(),
			final_model.sentence_count,
			final_model.table.len()
		);
		Ok(final_model)
	}

	/// Loads a model for a text corpus, one message per line.
	///
	/// - Reuses the `<stem>.bin` snapshot next to the file if it exists and
	///   has the requested order.
	/// - Otherwise trains in parallel from the text and writes the snapshot
	///   for future fast loading. An undecodable snapshot is replaced the
	///   same way.
	pub fn from_text_file<P: AsRef<Path>>(path: P, config: &CorpusConfig) -> ChainResult<Self> {
		let snapshot_path = build_output_path(&path, "bin")?;
		if snapshot_path.exists() {
			match Self::load(&snapshot_path, config.clone()) {
				Ok(model) => return Ok(model),
				Err(ChainError::OrderMismatch { expected, found }) => {
					log::info!(
						"Snapshot {} has order {}, rebuilding for order {}",
						snapshot_path.display(),
						found,
						expected
					);
				}
				Err(e @ (ChainError::Codec(_) | ChainError::CorruptSnapshot(_))) => {
					log::warn!(
						"Snapshot {} is unusable ({}), rebuilding from text",
						snapshot_path.display(),
						e
					);
				}
				Err(e) => return Err(e),
			}
		}

		let lines = read_file(&path)?;
		let model = Self::from_lines_parallel(&lines, config)?;
		model.save(&snapshot_path)?;
		Ok(model)
	}

	/// Writes a snapshot of this model to `path`.
	pub fn save<P: AsRef<Path>>(&self, path: P) -> ChainResult<()> {
		save_snapshot(&self.to_snapshot(), path)
	}

	/// Reads a model from a snapshot written by [`Self::save`].
	///
	/// # Errors
	/// Returns `OrderMismatch` if the snapshot order differs from
	/// `config.order()`, or any I/O, decoding or validation error.
	pub fn load<P: AsRef<Path>>(path: P, config: CorpusConfig) -> ChainResult<Self> {
		Self::from_snapshot(load_snapshot(path)?, config)
	}

	/// Generates a sentence; see [`generator::generate`].
	pub fn generate<R: Rng + ?Sized>(
		&self,
		constraints: &Constraints,
		rng: &mut R,
	) -> Result<Generation, GenerationError> {
		generator::generate(self, constraints, rng)
	}

	/// The model configuration.
	pub fn config(&self) -> &CorpusConfig {
		&self.config
	}

	/// The chain order.
	pub fn order(&self) -> usize {
		self.config.order
	}

	/// Read-only access to the transition table.
	pub fn table(&self) -> &TransitionTable {
		&self.table
	}

	/// Number of sentences ingested, duplicates included.
	pub fn sentence_count(&self) -> usize {
		self.sentence_count
	}

	/// Iterates over the canonical training sentences.
	pub fn training_sentences(&self) -> impl Iterator<Item = &str> {
		self.sentences.iter().map(String::as_str)
	}

	pub(crate) fn from_parts(
		config: CorpusConfig,
		table: TransitionTable,
		sentences: HashSet<String>,
		sentence_count: usize,
	) -> Self {
		Self {
			config,
			table,
			sentences,
			sentence_count,
		}
	}
}

/// `CorpusConfig` guarantees a non-zero order.
fn empty_table(order: usize) -> TransitionTable {
	TransitionTable::new(order.max(1)).unwrap_or_else(|_| unreachable!("order is at least 1"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::text::token::Token;

	fn permissive(order: usize) -> CorpusModel {
		CorpusModel::new(
			CorpusConfig::new(order)
				.unwrap()
				.with_filter(LearningFilter::permissive()),
		)
	}

	#[test]
	fn test_invalid_order() {
		assert!(matches!(
			CorpusModel::with_order(0),
			Err(ChainError::InvalidConfiguration { order: 0 })
		));
	}

	#[test]
	fn test_cats_and_dogs() {
		let mut model = permissive(1);
		assert_eq!(model.ingest("I like cats. I like dogs."), 2);

		let table = model.table();
		let key = |w: &str| vec![Token::word(w)];
		assert_eq!(table.count(&key("I"), &Token::word("like")), 2);
		assert_eq!(table.count(&key("like"), &Token::word("cats")), 1);
		assert_eq!(table.count(&key("like"), &Token::word("dogs")), 1);
		assert_eq!(model.sentence_count(), 2);
	}

	#[test]
	fn test_contains_sentence() {
		let mut model = permissive(2);
		model.ingest("The quick fox jumps.");

		assert!(model.contains_sentence("the quick fox jumps."));
		assert!(model.contains_sentence("The   QUICK fox jumps ."));
		assert!(!model.contains_sentence("the quick fox jumps"));
		assert!(!model.contains_sentence("the lazy dog sleeps."));
	}

	#[test]
	fn test_empty_input_is_a_noop() {
		let mut model = permissive(2);
		assert_eq!(model.ingest(""), 0);
		assert_eq!(model.ingest("   \n\t"), 0);
		assert!(model.is_empty());
		assert_eq!(model.sentence_count(), 0);
		assert_eq!(model.table().total_observations(), 0);
	}

	#[test]
	fn test_learning_filter() {
		let filter = LearningFilter::default();
		assert!(filter.accepts("hello there"));
		assert!(!filter.accepts("!roll 2d6"));
		assert!(!filter.accepts("  /help"));
		assert!(!filter.accepts("hey @everyone"));
		assert!(!filter.accepts("   "));

		let mut model = CorpusModel::default();
		assert_eq!(model.ingest("!roll 2d6"), 0);
		assert_eq!(model.ingest("ping @someone now"), 0);
		assert!(model.is_empty());
		assert_eq!(model.ingest("hello there"), 1);
		assert!(!model.is_empty());
	}

	#[test]
	fn test_growth_is_monotonic() {
		let mut model = permissive(2);
		let mut last = 0;
		for text in ["a b c.", "", "a b d. b c", "!!", "x"] {
			model.ingest(text);
			let total = model.table().total_observations();
			assert!(total >= last);
			last = total;
		}
		assert!(!model.is_empty());
	}

	#[test]
	fn test_reset() {
		let mut model = permissive(2);
		model.ingest("one two three.");
		model.reset();

		assert!(model.is_empty());
		assert_eq!(model.sentence_count(), 0);
		assert_eq!(model.training_sentences().count(), 0);
		assert!(!model.contains_sentence("one two three."));
		assert_eq!(model.order(), 2);
	}

	#[test]
	fn test_merge() {
		let mut a = permissive(2);
		a.ingest("I like cats.");
		let mut b = permissive(2);
		b.ingest("I like dogs.");

		a.merge(&b).unwrap();
		assert_eq!(a.sentence_count(), 2);
		assert!(a.contains_sentence("I like dogs."));
		assert_eq!(
			a.table().count(&a.table().start_key(), &Token::word("I")),
			2
		);

		let other = permissive(3);
		assert!(matches!(
			a.merge(&other),
			Err(ChainError::OrderMismatch { expected: 2, found: 3 })
		));
		assert_eq!(a.sentence_count(), 2);
	}

	#[test]
	fn test_parallel_training_matches_sequential() {
		let lines: Vec<String> = (0..200)
			.map(|i| format!("message number {} says hello {}.", i % 7, i % 3))
			.collect();
		let config = CorpusConfig::new(2).unwrap();

		let parallel = CorpusModel::from_lines_parallel(&lines, &config).unwrap();
		let mut sequential = CorpusModel::new(config.clone());
		sequential.ingest_messages(&lines);

		assert_eq!(parallel.table(), sequential.table());
		assert_eq!(parallel.sentence_count(), sequential.sentence_count());
		assert_eq!(parallel.training_sentences().count(), 21);

		let empty = CorpusModel::from_lines_parallel::<String>(&[], &config).unwrap();
		assert!(empty.is_empty());
	}
}
