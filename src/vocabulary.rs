//! Closed vocabularies injected into prompt construction.
//!
//! Prompts never hard-code habitat names or flag lists; they render whatever
//! `Vocabulary` they are given. `Vocabulary::coastal_brazil()` is the default
//! set used by the tagger, built from the enums in `models::enums`.

use serde::{Deserialize, Serialize};

use crate::models::{ActivityType, ArchaeologyFlag, Habitat};

/// A canonical tag plus the descriptive keywords that help the model
/// recognize it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub tag: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl VocabularyEntry {
    pub fn new(tag: &str, keywords: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// `tag` or `tag (kw1, kw2, ...)` for prompt listings.
    pub fn render(&self) -> String {
        if self.keywords.is_empty() {
            self.tag.clone()
        } else {
            format!("{} ({})", self.tag, self.keywords.join(", "))
        }
    }
}

/// The full set of closed vocabularies a prompt may reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub habitats: Vec<VocabularyEntry>,
    pub archaeology_flags: Vec<String>,
    pub activities: Vec<String>,
    /// Category prefixes allowed in hierarchical keywords (`bioma:...`).
    pub keyword_categories: Vec<String>,
}

impl Vocabulary {
    /// Brazilian coastal ecosystems vocabulary.
    pub fn coastal_brazil() -> Self {
        let habitats = Habitat::all()
            .iter()
            .map(|h| VocabularyEntry::new(h.as_str(), habitat_keywords(*h)))
            .collect();

        Self {
            habitats,
            archaeology_flags: ArchaeologyFlag::known()
                .iter()
                .map(|f| f.as_str().to_string())
                .collect(),
            activities: ActivityType::all()
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
            keyword_categories: KEYWORD_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn habitat_tags(&self) -> Vec<&str> {
        self.habitats.iter().map(|h| h.tag.as_str()).collect()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::coastal_brazil()
    }
}

/// Category prefixes for normalized keywords.
pub const KEYWORD_CATEGORIES: &[&str] = &[
    "bioma",
    "geomorfologia",
    "fauna",
    "flora",
    "atividade",
    "clima",
    "tecnica",
    "conservacao",
    "cores",
    "elementos",
];

fn habitat_keywords(habitat: Habitat) -> &'static [&'static str] {
    match habitat {
        Habitat::Manguezal => &[
            "mangrove",
            "rhizophora",
            "avicennia",
            "laguncularia",
            "raizes_aereas",
            "mare",
        ],
        Habitat::Restinga => &[
            "sandy_vegetation",
            "vegetation_coastal",
            "dunes_vegetation",
            "beach_ridge",
        ],
        Habitat::MataAtlantica => &["atlantic_forest", "rainforest", "tropical_forest", "floresta"],
        Habitat::Dunas => &["sand_dunes", "coastal_dunes", "areia", "vegetacao_dunar"],
        Habitat::Praia => &["beach", "shore", "shoreline", "sand", "waves", "surf"],
        Habitat::CostaoRochoso => &["rocky_shore", "intertidal", "tide_pools", "rocks", "algae"],
        Habitat::Estuario => &["estuary", "river_mouth", "brackish_water", "foz"],
        Habitat::Laguna => &["lagoon", "coastal_lagoon", "shallow_water"],
        Habitat::AreaUrbana => &["urban", "city", "buildings", "infrastructure", "port"],
        Habitat::Rio => &["river", "stream", "freshwater", "riparian"],
        Habitat::Serra => &["mountain", "highland", "slope", "elevation"],
        Habitat::Ilhas => &["island", "islet", "archipelago"],
        Habitat::Baia => &["bay", "sheltered_water", "inlet"],
        Habitat::AmbienteMarinho => &["open_sea", "marine", "offshore", "seawater"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vocabulary_covers_every_habitat() {
        let vocab = Vocabulary::coastal_brazil();
        assert_eq!(vocab.habitats.len(), Habitat::all().len());
        let tags = vocab.habitat_tags();
        assert!(tags.contains(&"manguezal"));
        assert!(tags.contains(&"costao_rochoso"));
        assert!(!tags.contains(&"tundra"));
    }

    #[test]
    fn entry_renders_keywords() {
        let entry = VocabularyEntry::new("laguna", &["lagoon", "shallow_water"]);
        assert_eq!(entry.render(), "laguna (lagoon, shallow_water)");
        assert_eq!(VocabularyEntry::new("rio", &[]).render(), "rio");
    }

    #[test]
    fn vocabulary_is_swappable() {
        let vocab = Vocabulary {
            habitats: vec![VocabularyEntry::new("recife", &["reef"])],
            archaeology_flags: vec![],
            activities: vec!["mergulho".into()],
            keyword_categories: vec!["bioma".into()],
        };
        assert_eq!(vocab.habitat_tags(), vec!["recife"]);
    }
}
