use serde::{Deserialize, Serialize};

use crate::models::{ArchaeologyFlag, MetadataRecord, SpeciesCandidate};

/// Minimum confidence for a fact to be surfaced by sinks and export tooling.
///
/// Assembly never consults these; records keep every candidate and the raw
/// confidence values. Gating is applied only where facts are presented.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    pub habitat: f32,
    pub species: f32,
    pub archaeology: f32,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            habitat: 0.6,
            species: 0.5,
            archaeology: 0.7,
        }
    }
}

impl ConfidenceThresholds {
    /// Habitat tag if its confidence clears the threshold and it is non-empty.
    pub fn surfaced_habitat<'a>(&self, record: &'a MetadataRecord) -> Option<&'a str> {
        let habitat = record.habitat_guess.trim();
        (!habitat.is_empty() && record.habitat_confidence >= self.habitat).then_some(habitat)
    }

    /// Species candidates at or above the threshold, in emission order.
    pub fn surfaced_species<'a>(&self, record: &'a MetadataRecord) -> Vec<&'a SpeciesCandidate> {
        record
            .species_candidates
            .iter()
            .filter(|s| s.confidence >= self.species)
            .collect()
    }

    /// All archaeology flags, or none when the reported confidence is too low.
    pub fn surfaced_archaeology<'a>(&self, record: &'a MetadataRecord) -> &'a [ArchaeologyFlag] {
        if record.archaeology_confidence >= self.archaeology {
            &record.archaeology_flags
        } else {
            &[]
        }
    }
}
