use std::collections::HashMap;

use crate::errors::RegistryError;

/// Selection weights over named corpus sources.
///
/// # Responsibilities
/// - Track per-source intensity (user-adjustable)
/// - Compute normalized selection probabilities
///
/// # Invariants
/// - `intensities` keys are fixed and correspond to available sources
/// - `probabilities` is always normalized, or uniform if all intensities are zero
#[derive(Clone, Debug, PartialEq)]
pub struct SourceWeights {
	/// User-adjustable intensities (not normalized).
	intensities: HashMap<String, f32>,

	/// Normalized probabilities derived from `intensities`.
	probabilities: HashMap<String, f32>,
}

impl SourceWeights {
	/// Creates weights with zero intensity (hence uniform probability) for
	/// every label.
	pub fn uniform<I, S>(labels: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut weights = Self {
			intensities: labels.into_iter().map(|label| (label.into(), 0.0)).collect(),
			probabilities: HashMap::new(),
		};
		weights.normalize();
		weights
	}

	/// Normalizes `intensities` into `probabilities`.
	///
	/// - If total intensity > 0, probabilities are proportional to intensities.
	/// - If all intensities are 0, distributes uniform probabilities.
	fn normalize(&mut self) {
		let sum: f32 = self.intensities.values().sum();

		self.probabilities.clear();

		if sum > 0.0 {
			for (label, intensity) in &self.intensities {
				self.probabilities.insert(label.clone(), intensity / sum);
			}
		} else if !self.intensities.is_empty() {
			let uniform = 1.0 / self.intensities.len() as f32;
			for label in self.intensities.keys() {
				self.probabilities.insert(label.clone(), uniform);
			}
		}
	}

	/// Sets the intensity of a source and renormalizes.
	///
	/// # Errors
	/// - `UnknownSource` if the label was not declared.
	/// - `InvalidIntensity` if `intensity` is negative or not finite.
	pub fn set_intensity(&mut self, label: &str, intensity: f32) -> Result<(), RegistryError> {
		if !intensity.is_finite() || intensity < 0.0 {
			return Err(RegistryError::InvalidIntensity(intensity));
		}
		match self.intensities.get_mut(label) {
			Some(value) => *value = intensity,
			None => return Err(RegistryError::UnknownSource(label.to_owned())),
		}
		self.normalize();
		Ok(())
	}

	/// Normalized probability of a source (0.0 if unknown).
	pub fn probability(&self, label: &str) -> f32 {
		self.probabilities.get(label).copied().unwrap_or(0.0)
	}

	/// Iterates over `(label, probability)` pairs.
	pub fn probabilities(&self) -> impl Iterator<Item = (&str, f32)> {
		self.probabilities.iter().map(|(k, v)| (k.as_str(), *v))
	}
}
