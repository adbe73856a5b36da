use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use rand::Rng;

use super::constraints::Constraints;
use super::corpus::CorpusModel;
use super::generator::Generation;
use super::snapshot::CorpusSnapshot;
use crate::errors::GenerationError;

/// A corpus model shared between an ingesting writer and generating readers.
///
/// Generation runs under a read lock, so it always sees a table that is not
/// halfway through a merge; `ingest` and `reset` take the write lock.
/// Cloning the handle shares the same model.
#[derive(Clone, Debug, Default)]
pub struct SharedCorpus {
	inner: Arc<RwLock<CorpusModel>>,
}

impl SharedCorpus {
	/// Wraps a model.
	pub fn new(model: CorpusModel) -> Self {
		Self {
			inner: Arc::new(RwLock::new(model)),
		}
	}

	/// Learns a message; see [`CorpusModel::ingest`].
	pub fn ingest(&self, text: &str) -> usize {
		self.inner.write().ingest(text)
	}

	/// Generates a sentence; see [`CorpusModel::generate`].
	pub fn generate<R: Rng + ?Sized>(
		&self,
		constraints: &Constraints,
		rng: &mut R,
	) -> Result<Generation, GenerationError> {
		self.inner.read().generate(constraints, rng)
	}

	/// See [`CorpusModel::contains_sentence`].
	pub fn contains_sentence(&self, candidate: &str) -> bool {
		self.inner.read().contains_sentence(candidate)
	}

	/// See [`CorpusModel::is_empty`].
	pub fn is_empty(&self) -> bool {
		self.inner.read().is_empty()
	}

	/// See [`CorpusModel::reset`].
	pub fn reset(&self) {
		self.inner.write().reset();
	}

	/// Exports a consistent snapshot.
	pub fn snapshot(&self) -> CorpusSnapshot {
		self.inner.read().to_snapshot()
	}

	/// Read access for queries not covered above.
	pub fn read(&self) -> RwLockReadGuard<'_, CorpusModel> {
		self.inner.read()
	}
}
