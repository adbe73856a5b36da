use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::corpus::{CorpusConfig, CorpusModel};
use super::transition_table::TransitionTable;
use crate::errors::{ChainError, ChainResult};
use crate::text::token::Token;

/// Outgoing transitions of one context, in plain form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SnapshotState {
	/// The context, exactly `order` tokens.
	pub context: Vec<Token>,
	/// `(next token, count)` pairs, counts >= 1.
	pub transitions: Vec<(Token, usize)>,
}

/// Plain representation of a corpus model.
///
/// The encoding is left to the host: any serde format works. The crate's
/// own `io` helpers use postcard.
///
/// Contexts and sentences are sorted so equal models give equal snapshots.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CorpusSnapshot {
	/// The chain order.
	pub order: usize,
	/// Every context with its transitions.
	pub states: Vec<SnapshotState>,
	/// Canonical training sentences.
	pub sentences: Vec<String>,
	/// Number of sentences ingested, duplicates included.
	pub sentence_count: usize,
}

impl CorpusModel {
	/// Exports the model into its plain representation.
	pub fn to_snapshot(&self) -> CorpusSnapshot {
		let mut states: Vec<SnapshotState> = self
			.table()
			.states()
			.map(|(context, state)| SnapshotState {
				context: context.to_vec(),
				transitions: state
					.transitions()
					.map(|(next, count)| (next.clone(), count))
					.collect(),
			})
			.collect();
		states.sort_by(|a, b| a.context.cmp(&b.context));

		let mut sentences: Vec<String> = self.training_sentences().map(str::to_owned).collect();
		sentences.sort();

		CorpusSnapshot {
			order: self.order(),
			states,
			sentences,
			sentence_count: self.sentence_count(),
		}
	}

	/// Rebuilds a model from its plain representation.
	///
	/// # Errors
	/// - `OrderMismatch` if `snapshot.order` differs from `config.order()`.
	/// - `CorruptSnapshot` if a context has the wrong length, a count is
	///   zero, or a context has no transition.
	pub fn from_snapshot(snapshot: CorpusSnapshot, config: CorpusConfig) -> ChainResult<Self> {
		if snapshot.order != config.order() {
			return Err(ChainError::OrderMismatch {
				expected: config.order(),
				found: snapshot.order,
			});
		}

		let mut table = TransitionTable::new(snapshot.order)?;
		for state in snapshot.states {
			if state.context.len() != snapshot.order {
				return Err(ChainError::CorruptSnapshot(format!(
					"context of {} tokens in an order-{} table",
					state.context.len(),
					snapshot.order
				)));
			}
			if state.transitions.is_empty() {
				return Err(ChainError::CorruptSnapshot("context without transitions".to_owned()));
			}
			for (next, count) in state.transitions {
				if count == 0 {
					return Err(ChainError::CorruptSnapshot(format!(
						"zero count for transition to {next}"
					)));
				}
				table.insert_observations(&state.context, next, count);
			}
		}

		let sentences: HashSet<String> = snapshot.sentences.into_iter().collect();
		Ok(CorpusModel::from_parts(
			config,
			table,
			sentences,
			snapshot.sentence_count,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::corpus::LearningFilter;

	fn trained() -> CorpusModel {
		let mut model = CorpusModel::new(
			CorpusConfig::new(2)
				.unwrap()
				.with_filter(LearningFilter::permissive()),
		);
		model.ingest("I like cats. I like dogs. Dogs like bones!");
		model
	}

	#[test]
	fn test_snapshot_restores_model() {
		let model = trained();
		let restored = CorpusModel::from_snapshot(model.to_snapshot(), model.config().clone()).unwrap();

		assert_eq!(restored.table(), model.table());
		assert_eq!(restored.sentence_count(), 3);
		assert!(restored.contains_sentence("dogs like bones!"));
		assert_eq!(restored.to_snapshot(), model.to_snapshot());
	}

	#[test]
	fn test_snapshot_is_encoding_agnostic() {
		let model = trained();
		let json = serde_json::to_string(&model.to_snapshot()).unwrap();
		let decoded: CorpusSnapshot = serde_json::from_str(&json).unwrap();
		assert_eq!(decoded, model.to_snapshot());

		let bytes = postcard::to_stdvec(&model.to_snapshot()).unwrap();
		let decoded: CorpusSnapshot = postcard::from_bytes(&bytes).unwrap();
		assert_eq!(decoded, model.to_snapshot());
	}

	#[test]
	fn test_corrupt_snapshots_are_rejected() {
		let config = CorpusConfig::new(2).unwrap();

		let mut snapshot = trained().to_snapshot();
		snapshot.order = 3;
		assert!(matches!(
			CorpusModel::from_snapshot(snapshot, config.clone()),
			Err(ChainError::OrderMismatch { expected: 2, found: 3 })
		));

		let mut snapshot = trained().to_snapshot();
		snapshot.states[0].context.pop();
		assert!(matches!(
			CorpusModel::from_snapshot(snapshot, config.clone()),
			Err(ChainError::CorruptSnapshot(_))
		));

		let mut snapshot = trained().to_snapshot();
		snapshot.states[0].transitions[0].1 = 0;
		assert!(matches!(
			CorpusModel::from_snapshot(snapshot, config.clone()),
			Err(ChainError::CorruptSnapshot(_))
		));

		let mut snapshot = trained().to_snapshot();
		snapshot.states[0].transitions.clear();
		assert!(matches!(
			CorpusModel::from_snapshot(snapshot, config),
			Err(ChainError::CorruptSnapshot(_))
		));
	}
}
