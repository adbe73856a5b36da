use std::collections::BTreeMap;

use rand::Rng;

use crate::text::token::Token;

/// Outgoing transitions of one context (an `order`-token tuple).
///
/// Conceptually, this is a node in a Markov chain where outgoing edges
/// are weighted by their number of observations.
///
/// ## Responsibilities:
/// - Accumulate transition occurrences during learning
/// - Predict the next token using weighted random sampling
/// - Merge with another state observed for the same context
///
/// ## Invariants
/// - Each transition occurrence count is strictly positive
/// - `total` is the sum of all occurrence counts
///
/// Transitions are kept ordered so the cumulative weights (and therefore
/// seeded generation) do not depend on hashing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct State {
	/// Outgoing transitions indexed by the next token.
	/// Example: { "cats" => 2, "dogs" => 1 }
	transitions: BTreeMap<Token, usize>,

	/// Sum of all occurrence counts.
	total: usize,
}

impl State {
	/// Creates a new empty state.
	pub fn new() -> Self {
		Self::default()
	}

	/// Records one occurrence of a transition toward `next`.
	pub fn add_transition(&mut self, next: Token) {
		self.add_observations(next, 1);
	}

	/// Records `count` occurrences of a transition toward `next`.
	///
	/// A zero count is ignored so no zero entry can ever be stored.
	pub(crate) fn add_observations(&mut self, next: Token, count: usize) {
		if count == 0 {
			return;
		}
		*self.transitions.entry(next).or_insert(0) += count;
		self.total += count;
	}

	/// Number of times `next` followed this context.
	pub fn count(&self, next: &Token) -> usize {
		self.transitions.get(next).copied().unwrap_or(0)
	}

	/// Total number of observations leaving this context.
	pub fn total(&self) -> usize {
		self.total
	}

	/// Number of distinct next tokens.
	pub fn len(&self) -> usize {
		self.transitions.len()
	}

	/// True if nothing was observed.
	pub fn is_empty(&self) -> bool {
		self.transitions.is_empty()
	}

	/// Iterates over `(next token, count)` pairs in token order.
	pub fn transitions(&self) -> impl Iterator<Item = (&Token, usize)> {
		self.transitions.iter().map(|(token, count)| (token, *count))
	}

	/// Builds the cumulative weight array: each entry holds the exclusive
	/// upper bound of its token's slice of `0..total`.
	///
	/// Example: { a => 2, b => 1 } gives [(a, 2), (b, 3)].
	pub fn cumulative_weights(&self) -> Vec<(&Token, usize)> {
		let mut running = 0;
		self.transitions
			.iter()
			.map(|(token, count)| {
				running += count;
				(token, running)
			})
			.collect()
	}

	/// Predicts the next token using weighted random sampling.
	///
	/// Draws `r` uniformly in `0..total` and returns the first token whose
	/// cumulative bound exceeds `r`, so each token is chosen with
	/// probability `count / total`.
	///
	/// Returns `None` if the state has no transitions.
	pub fn predict<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Token> {
		if self.total == 0 {
			return None;
		}

		let cumulative = self.cumulative_weights();
		let r = rng.random_range(0..self.total);
		let index = cumulative.partition_point(|(_, upper)| *upper <= r);
		cumulative.get(index).map(|(token, _)| *token)
	}

	/// Merges another state observed for the same context.
	///
	/// Transition occurrence counts are summed.
	pub fn merge(&mut self, other: &Self) {
		for (next, count) in &other.transitions {
			self.add_observations(next.clone(), *count);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	fn state(pairs: &[(&str, usize)]) -> State {
		let mut state = State::new();
		for (word, count) in pairs {
			state.add_observations(Token::word(*word), *count);
		}
		state
	}

	#[test]
	fn test_counts_and_total() {
		let mut state = State::new();
		assert!(state.is_empty());
		assert_eq!(state.predict(&mut StdRng::seed_from_u64(0)), None);

		state.add_transition(Token::word("cats"));
		state.add_transition(Token::word("cats"));
		state.add_transition(Token::End);
		state.add_observations(Token::word("dogs"), 0);

		assert_eq!(state.count(&Token::word("cats")), 2);
		assert_eq!(state.count(&Token::End), 1);
		assert_eq!(state.count(&Token::word("dogs")), 0);
		assert_eq!(state.len(), 2);
		assert_eq!(state.total(), 3);
	}

	#[test]
	fn test_cumulative_weights() {
		let state = state(&[("a", 2), ("b", 1), ("c", 3)]);
		let bounds: Vec<usize> = state.cumulative_weights().iter().map(|(_, b)| *b).collect();
		assert_eq!(bounds, vec![2, 3, 6]);
	}

	#[test]
	fn test_predict_follows_frequencies() {
		let state = state(&[("often", 3), ("rarely", 1)]);
		let mut rng = StdRng::seed_from_u64(7);

		let draws = 8000;
		let often = (0..draws)
			.filter(|_| state.predict(&mut rng) == Some(&Token::word("often")))
			.count();

		// Expect ~75%, not the 50% of a uniform pick over distinct tokens
		let ratio = often as f64 / draws as f64;
		assert!((0.71..0.79).contains(&ratio), "ratio = {ratio}");
	}

	#[test]
	fn test_merge() {
		let mut a = state(&[("x", 1), ("y", 2)]);
		let b = state(&[("y", 3), ("z", 1)]);
		a.merge(&b);

		assert_eq!(a.count(&Token::word("x")), 1);
		assert_eq!(a.count(&Token::word("y")), 5);
		assert_eq!(a.count(&Token::word("z")), 1);
		assert_eq!(a.total(), 7);
	}
}
