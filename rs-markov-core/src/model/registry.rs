use std::collections::HashMap;

use rand::Rng;

use super::constraints::Constraints;
use super::corpus::{CorpusConfig, CorpusModel};
use super::generator::Generation;
use super::source_weights::SourceWeights;
use crate::errors::{GenerationError, RegistryError};

/// Corpus models keyed by source label (channel, topic, file...).
///
/// # Responsibilities
/// - Create models lazily when a new source starts feeding text
/// - Keep sources independent: no state is shared between models
/// - Generate from a source picked by weighted random order, falling back
///   to the next source when one cannot produce a sentence
#[derive(Clone, Debug, Default)]
pub struct CorpusRegistry {
	/// Configuration for lazily created sources.
	config: CorpusConfig,
	sources: HashMap<String, CorpusModel>,
}

impl CorpusRegistry {
	/// Creates an empty registry; new sources use `config`.
	pub fn new(config: CorpusConfig) -> Self {
		Self {
			config,
			sources: HashMap::new(),
		}
	}

	/// Learns a message into the given source, creating it if needed.
	///
	/// Returns the number of sentences learned.
	pub fn ingest(&mut self, label: &str, text: &str) -> usize {
		self.sources
			.entry(label.to_owned())
			.or_insert_with(|| CorpusModel::new(self.config.clone()))
			.ingest(text)
	}

	/// Registers a model under `label`, returning the one it replaces.
	pub fn insert(&mut self, label: impl Into<String>, model: CorpusModel) -> Option<CorpusModel> {
		self.sources.insert(label.into(), model)
	}

	/// Removes a source.
	pub fn remove(&mut self, label: &str) -> Option<CorpusModel> {
		self.sources.remove(label)
	}

	/// Returns the model of a source.
	pub fn get(&self, label: &str) -> Option<&CorpusModel> {
		self.sources.get(label)
	}

	/// Resets a source.
	///
	/// # Errors
	/// Returns `UnknownSource` if the label is not registered.
	pub fn reset(&mut self, label: &str) -> Result<(), RegistryError> {
		match self.sources.get_mut(label) {
			Some(model) => {
				model.reset();
				Ok(())
			}
			None => Err(RegistryError::UnknownSource(label.to_owned())),
		}
	}

	/// Removes every source.
	pub fn clear(&mut self) {
		self.sources.clear();
	}

	/// Sorted source labels.
	pub fn labels(&self) -> Vec<String> {
		let mut labels: Vec<String> = self.sources.keys().cloned().collect();
		labels.sort();
		labels
	}

	/// Iterates over every source.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &CorpusModel)> {
		self.sources.iter().map(|(label, model)| (label.as_str(), model))
	}

	/// Number of sources.
	pub fn len(&self) -> usize {
		self.sources.len()
	}

	/// True if no source is registered.
	pub fn is_empty(&self) -> bool {
		self.sources.is_empty()
	}

	/// Configuration used for new sources.
	pub fn config(&self) -> &CorpusConfig {
		&self.config
	}

	/// Creates uniform weights over the current sources.
	pub fn make_weights(&self) -> SourceWeights {
		SourceWeights::uniform(self.sources.keys().cloned())
	}

	/// Returns source labels in a weighted random order.
	///
	/// Sources with higher probability are more likely to appear earlier.
	/// Only registered sources with a positive weight are included.
	pub fn weighted_order<R: Rng + ?Sized>(&self, weights: &SourceWeights, rng: &mut R) -> Vec<String> {
		let mut scored: Vec<(String, f64)> = self
			.labels()
			.into_iter()
			.filter_map(|label| {
				let weight = weights.probability(&label);
				if weight > 0.0 {
					let u: f64 = rng.random();
					Some((label, u.powf(1.0 / weight as f64)))
				} else {
					None
				}
			})
			.collect();

		scored.sort_by(|a, b| b.1.total_cmp(&a.1));

		scored.into_iter().map(|(label, _)| label).collect()
	}

	/// Generates a sentence from one of the sources.
	///
	/// Tries sources in [`Self::weighted_order`] and returns the label of the
	/// source that produced the sentence.
	///
	/// # Errors
	/// - `ModelEmpty` if no source has a positive weight.
	/// - The last source's error if every source failed.
	pub fn generate<R: Rng + ?Sized>(
		&self,
		weights: &SourceWeights,
		constraints: &Constraints,
		rng: &mut R,
	) -> Result<(String, Generation), GenerationError> {
		let mut last_error = GenerationError::ModelEmpty;
		for label in self.weighted_order(weights, rng) {
			let Some(model) = self.sources.get(&label) else {
				continue;
			};
			match model.generate(constraints, rng) {
				Ok(generation) => return Ok((label, generation)),
				Err(e) => {
					log::debug!("Source {} failed: {}", label, e);
					last_error = e;
				}
			}
		}
		Err(last_error)
	}
}
