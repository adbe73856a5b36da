use std::collections::HashMap;

use rand::Rng;
use rand::prelude::IteratorRandom;

use super::state::State;
use crate::errors::{ChainError, ChainResult};
use crate::text::token::Token;

/// A context key: exactly `order` tokens.
pub type StateKey = Box<[Token]>;

/// Represents a word-level Markov chain of fixed order.
///
/// The `TransitionTable` maps every observed context of `order` tokens
/// to the tokens that followed it, with observation counts.
///
/// # Responsibilities
/// - Build the table from sentinel-bounded token sequences
/// - Accumulate transition counts for each context
/// - Predict the next token given a context
/// - Merge with another table of the same order
///
/// # Invariants
/// - `order` is always >= 1 and never changes
/// - Every key holds exactly `order` tokens
/// - All transition counts are >= 1
/// - `total` is the sum of every state's total
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionTable {
	/// The order of the chain (number of tokens in a context)
	order: usize, // must be >= 1

	/// Mapping from a context to its outgoing transitions
	states: HashMap<StateKey, State>,

	/// Sum of all observation counts
	total: usize,
}

impl TransitionTable {
	/// Creates a new empty table of order `order`.
	///
	/// # Errors
	/// Returns `InvalidConfiguration` if `order == 0`.
	pub fn new(order: usize) -> ChainResult<Self> {
		if order == 0 {
			return Err(ChainError::InvalidConfiguration { order });
		}
		Ok(Self {
			order,
			states: HashMap::new(),
			total: 0,
		})
	}

	/// Builds a table from a batch of token sequences.
	///
	/// # Errors
	/// Returns `InvalidConfiguration` if `order == 0`.
	pub fn build<I, S>(sequences: I, order: usize) -> ChainResult<Self>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<[Token]>,
	{
		let mut table = Self::new(order)?;
		for sequence in sequences {
			table.add_sequence(sequence.as_ref());
		}
		Ok(table)
	}

	/// Adds one sentence's token sequence to the table.
	///
	/// Sequences opening with `Begin` are normalized to exactly `order`
	/// leading `Begin` tokens, so every sentence is reachable from
	/// [`Self::start_key`]. Each window of `order` tokens then records one
	/// transition to the token that follows it.
	///
	/// Returns the number of transitions recorded.
	///
	/// # Notes
	/// - Sequences of `order` tokens or fewer contribute nothing.
	pub fn add_sequence(&mut self, tokens: &[Token]) -> usize {
		let leading = tokens.iter().take_while(|t| **t == Token::Begin).count();
		let padded: Vec<Token>;
		let tokens = if leading > 0 && leading != self.order {
			padded = self
				.start_key()
				.into_iter()
				.chain(tokens[leading..].iter().cloned())
				.collect();
			&padded[..]
		} else {
			tokens
		};

		if tokens.len() <= self.order {
			// Sequence too short, no window to record
			return 0;
		}

		for window in tokens.windows(self.order + 1) {
			let (key, next) = window.split_at(self.order);
			self.insert_observations(key, next[0].clone(), 1);
		}
		tokens.len() - self.order
	}

	/// Records `count` observations of `key -> next`.
	pub(crate) fn insert_observations(&mut self, key: &[Token], next: Token, count: usize) {
		if count == 0 {
			return;
		}
		match self.states.get_mut(key) {
			Some(state) => state.add_observations(next, count),
			None => {
				let mut state = State::new();
				state.add_observations(next, count);
				self.states.insert(key.into(), state);
			}
		}
		self.total += count;
	}

	/// The order of the chain.
	pub fn order(&self) -> usize {
		self.order
	}

	/// The sentence-start context: `order` copies of `Begin`.
	pub fn start_key(&self) -> Vec<Token> {
		vec![Token::Begin; self.order]
	}

	/// Number of distinct contexts.
	pub fn len(&self) -> usize {
		self.states.len()
	}

	/// True if no transition was ever recorded.
	pub fn is_empty(&self) -> bool {
		self.states.is_empty()
	}

	/// Sum of all observation counts.
	pub fn total_observations(&self) -> usize {
		self.total
	}

	/// Returns the transitions leaving `key`, if any.
	pub fn state(&self, key: &[Token]) -> Option<&State> {
		self.states.get(key)
	}

	/// Number of observations of `key -> next`.
	pub fn count(&self, key: &[Token], next: &Token) -> usize {
		self.state(key).map_or(0, |state| state.count(next))
	}

	/// Predicts the next token given a context.
	///
	/// Returns `None` if the context is unknown or has no transitions.
	pub fn predict<R: Rng + ?Sized>(&self, key: &[Token], rng: &mut R) -> Option<&Token> {
		self.states.get(key)?.predict(rng)
	}

	/// Returns a random context from the table.
	///
	/// Useful for starting a generation mid-sentence.
	/// Returns `None` if the table has no states.
	///
	/// Keys are sorted before drawing: `HashMap` order differs between two
	/// equal tables, and a seeded `rng` must pick the same context in both.
	pub fn random_key<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&[Token]> {
		let mut keys: Vec<&StateKey> = self.states.keys().collect();
		keys.sort_unstable();
		keys.into_iter().choose(rng).map(|key| &key[..])
	}

	/// Iterates over every `(context, next token, count)` triple.
	pub fn entries(&self) -> impl Iterator<Item = (&[Token], &Token, usize)> {
		self.states.iter().flat_map(|(key, state)| {
			state
				.transitions()
				.map(move |(next, count)| (&key[..], next, count))
		})
	}

	/// Iterates over every context and its transitions.
	pub fn states(&self) -> impl Iterator<Item = (&[Token], &State)> {
		self.states.iter().map(|(key, state)| (&key[..], state))
	}

	/// Merges another table into this one.
	///
	/// # Notes
	/// - Both tables must have the same order.
	/// - Counts for matching transitions are summed, new ones are inserted,
	///   so merging is associative and commutative.
	///
	/// # Errors
	/// Returns `OrderMismatch` if the orders differ.
	pub fn merge(&mut self, other: &Self) -> ChainResult<()> {
		if self.order != other.order {
			return Err(ChainError::OrderMismatch {
				expected: self.order,
				found: other.order,
			});
		}

		for (key, state) in &other.states {
			if let Some(existing) = self.states.get_mut(key) {
				existing.merge(state);
			} else {
				self.states.insert(key.clone(), state.clone());
			}
		}
		self.total += other.total;

		Ok(())
	}

	/// Returns the union of two tables, leaving both untouched.
	///
	/// # Errors
	/// Returns `OrderMismatch` if the orders differ.
	pub fn merged(a: &Self, b: &Self) -> ChainResult<Self> {
		let mut table = a.clone();
		table.merge(b)?;
		Ok(table)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;
	use std::collections::BTreeMap;

	fn words(text: &str) -> Vec<Token> {
		std::iter::once(Token::Begin)
			.chain(text.split_whitespace().map(Token::word))
			.chain(std::iter::once(Token::End))
			.collect()
	}

	fn flatten(table: &TransitionTable) -> BTreeMap<(Vec<Token>, Token), usize> {
		table
			.entries()
			.map(|(key, next, count)| ((key.to_vec(), next.clone()), count))
			.collect()
	}

	#[test]
	fn test_order_zero_is_rejected() {
		assert!(matches!(
			TransitionTable::new(0),
			Err(ChainError::InvalidConfiguration { order: 0 })
		));
		assert!(TransitionTable::build(Vec::<Vec<Token>>::new(), 0).is_err());
	}

	#[test]
	fn test_build_order_one() {
		let table = TransitionTable::build([words("I like cats ."), words("I like dogs .")], 1).unwrap();

		let key = |w: &str| vec![Token::word(w)];
		assert_eq!(table.count(&key("I"), &Token::word("like")), 2);
		assert_eq!(table.count(&key("like"), &Token::word("cats")), 1);
		assert_eq!(table.count(&key("like"), &Token::word("dogs")), 1);
		assert_eq!(table.count(&[Token::Begin], &Token::word("I")), 2);
		assert_eq!(table.count(&key("."), &Token::End), 2);
		assert_eq!(table.state(&key("like")).unwrap().total(), 2);
		assert_eq!(table.total_observations(), 10);
	}

	#[test]
	fn test_build_pads_start_for_higher_orders() {
		let table = TransitionTable::build([words("a b")], 3).unwrap();

		assert_eq!(table.start_key(), vec![Token::Begin; 3]);
		assert_eq!(table.count(&table.start_key(), &Token::word("a")), 1);
		assert_eq!(
			table.count(&[Token::Begin, Token::Begin, Token::word("a")], &Token::word("b")),
			1
		);
		assert_eq!(
			table.count(&[Token::Begin, Token::word("a"), Token::word("b")], &Token::End),
			1
		);
		assert_eq!(table.len(), 3);

		// Over-padded input is trimmed back to `order` sentinels
		let mut over = vec![Token::Begin; 5];
		over.extend(words("a b").into_iter().skip(1));
		let again = TransitionTable::build([over], 3).unwrap();
		assert_eq!(flatten(&again), flatten(&table));
	}

	#[test]
	fn test_short_sequences_are_skipped() {
		let mut table = TransitionTable::new(2).unwrap();
		assert_eq!(table.add_sequence(&[Token::word("alone")]), 0);
		assert_eq!(table.add_sequence(&[Token::word("a"), Token::word("b")]), 0);
		assert_eq!(table.add_sequence(&[]), 0);
		assert!(table.is_empty());

		assert_eq!(table.add_sequence(&[Token::word("a"), Token::word("b"), Token::word("c")]), 1);
		assert!(!table.is_empty());
	}

	#[test]
	fn test_merge_order_mismatch() {
		let mut a = TransitionTable::new(1).unwrap();
		let b = TransitionTable::new(2).unwrap();
		assert!(matches!(
			a.merge(&b),
			Err(ChainError::OrderMismatch { expected: 1, found: 2 })
		));
	}

	#[test]
	fn test_random_key() {
		let table = TransitionTable::build([words("x y")], 2).unwrap();
		let mut rng = rand::rng();
		let key = table.random_key(&mut rng).unwrap();
		assert!(table.state(key).is_some());
		assert_eq!(TransitionTable::new(2).unwrap().random_key(&mut rng), None);
	}

	#[test]
	fn test_random_key_is_seed_determined() {
		let sentences = ["the cat sat on the mat", "a dog ran to the park", "birds sing at dawn"];
		let a = TransitionTable::build(sentences.iter().map(|s| words(s)), 2).unwrap();
		let b = TransitionTable::build(sentences.iter().map(|s| words(s)), 2).unwrap();

		let mut rng_a = StdRng::seed_from_u64(42);
		let mut rng_b = StdRng::seed_from_u64(42);
		for _ in 0..20 {
			assert_eq!(a.random_key(&mut rng_a), b.random_key(&mut rng_b));
		}
	}

	fn arb_table() -> impl Strategy<Value = TransitionTable> {
		proptest::collection::vec("[abc]( [abc]){0,4}", 0..6)
			.prop_map(|sentences| TransitionTable::build(sentences.iter().map(|s| words(s)), 2).unwrap())
	}

	proptest! {
		#[test]
		fn test_merge_is_commutative(a in arb_table(), b in arb_table()) {
			let ab = TransitionTable::merged(&a, &b).unwrap();
			let ba = TransitionTable::merged(&b, &a).unwrap();
			prop_assert_eq!(flatten(&ab), flatten(&ba));
			prop_assert_eq!(ab.total_observations(), a.total_observations() + b.total_observations());
		}

		#[test]
		fn test_merge_is_associative(a in arb_table(), b in arb_table(), c in arb_table()) {
			let left = TransitionTable::merged(&TransitionTable::merged(&a, &b).unwrap(), &c).unwrap();
			let right = TransitionTable::merged(&a, &TransitionTable::merged(&b, &c).unwrap()).unwrap();
			prop_assert_eq!(flatten(&left), flatten(&right));
		}
	}
}
