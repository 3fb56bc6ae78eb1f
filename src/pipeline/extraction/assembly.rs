//! Builds the final `MetadataRecord` from the two recovered pass results.
//!
//! Lenient by construction: a missing or non-numeric number becomes 0.0 and
//! a missing list becomes empty. A species object with bad fields is kept
//! with defaults, a non-blank string becomes its common name, and any other
//! species item (number, bool, null, list) is skipped. Confidence values are
//! copied through untouched; gating happens downstream.

use chrono::Utc;
use serde_json::{Map, Value};

use crate::models::{
    ArchaeologyFlag, LocationGuess, MetadataRecord, SourceTag, SpeciesCandidate, TaxonomyLevel,
    TechnicalQuality,
};

type Object = Map<String, Value>;

/// Identity of the image a record is being assembled for.
#[derive(Debug, Clone, Copy)]
pub struct RecordIdentity<'a> {
    pub file_id: &'a str,
    pub source: SourceTag,
    pub filename: &'a str,
}

/// Merge raw-pass facts and normalization facts into one record.
///
/// Habitat, species, archaeology, activities, technical quality and location
/// come from `raw`; title, descriptions and keywords from `normalized`.
pub fn assemble_record(raw: &Object, normalized: &Object, id: RecordIdentity<'_>) -> MetadataRecord {
    MetadataRecord {
        file_id: id.file_id.to_string(),
        source: id.source,
        original_filename: id.filename.to_string(),

        title: text_field(normalized, "title"),
        description_short: text_field(normalized, "description_short"),
        description_long: text_field(normalized, "description_long"),

        habitat_guess: text_field(raw, "habitat_guess"),
        habitat_confidence: number_field(raw, "habitat_confidence"),
        habitat_evidence: text_field(raw, "habitat_evidence"),

        species_candidates: species_field(raw),

        archaeology_flags: string_list(raw, "archaeology_flags")
            .into_iter()
            .map(ArchaeologyFlag::from)
            .collect(),
        archaeology_evidence: text_field(raw, "archaeology_evidence"),
        archaeology_confidence: number_field(raw, "archaeology_confidence"),

        keywords: dedup_keep_order(string_list(normalized, "keywords_normalized")),

        location_guess: raw.get("location_guess").and_then(parse_location),
        activities: string_list(raw, "activities"),
        technical_quality: technical_quality(raw),

        processing_timestamp: Utc::now(),
    }
}

// ──────────────────────────────────────────────
// Field readers
// ──────────────────────────────────────────────

fn text_field(obj: &Object, key: &str) -> String {
    obj.get(key).map(value_as_text).unwrap_or_default()
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // Nested structures are not meaningful as free text.
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn number_field(obj: &Object, key: &str) -> f32 {
    obj.get(key).map(value_as_number).unwrap_or(0.0)
}

/// Numbers and numeric strings parse; everything else is 0.0.
fn value_as_number(value: &Value) -> f32 {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32).unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f32>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// List of strings. Non-string items are stringified, empty ones dropped.
fn string_list(obj: &Object, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(value_as_text)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn dedup_keep_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn species_field(raw: &Object) -> Vec<SpeciesCandidate> {
    let Some(Value::Array(items)) = raw.get("species_candidates") else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(sp) => Some(SpeciesCandidate {
                common_name: text_field(sp, "name_pt"),
                scientific_name: text_field(sp, "name_scientific"),
                confidence: number_field(sp, "confidence"),
                evidence: text_field(sp, "evidence"),
                taxonomy_level: sp
                    .get("taxonomy_level")
                    .and_then(Value::as_str)
                    .map(TaxonomyLevel::parse_lenient)
                    .unwrap_or(TaxonomyLevel::Species),
            }),
            Value::String(name) if !name.trim().is_empty() => Some(SpeciesCandidate {
                common_name: name.clone(),
                scientific_name: String::new(),
                confidence: 0.0,
                evidence: String::new(),
                taxonomy_level: TaxonomyLevel::Species,
            }),
            _ => {
                tracing::debug!(item = %item, "Skipping unusable species candidate");
                None
            }
        })
        .collect()
}

fn technical_quality(raw: &Object) -> Option<TechnicalQuality> {
    let text = text_field(raw, "technical_quality");
    if text.trim().is_empty() {
        None
    } else {
        Some(TechnicalQuality::from(text))
    }
}

fn parse_location(value: &Value) -> Option<LocationGuess> {
    let Value::Object(loc) = value else {
        return None;
    };
    Some(LocationGuess {
        description: text_field(loc, "description"),
        confidence: number_field(loc, "confidence"),
        evidence: text_field(loc, "evidence"),
        coordinates: loc.get("coordinates").and_then(parse_coordinates),
    })
}

/// `[lat, lon]`, `{"lat", "lon"}` or `{"latitude", "longitude"}`.
fn parse_coordinates(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Array(pair) if pair.len() == 2 => Some((pair[0].as_f64()?, pair[1].as_f64()?)),
        Value::Object(obj) => {
            let lat = obj.get("lat").or_else(|| obj.get("latitude"))?.as_f64()?;
            let lon = obj.get("lon").or_else(|| obj.get("longitude"))?.as_f64()?;
            Some((lat, lon))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Object {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn identity() -> RecordIdentity<'static> {
        RecordIdentity {
            file_id: "img001",
            source: SourceTag::FirstPartyArchive,
            filename: "img001.CR3",
        }
    }

    #[test]
    fn missing_habitat_confidence_defaults_to_zero() {
        let raw = obj(json!({"habitat_guess": "praia"}));
        let record = assemble_record(&raw, &Map::new(), identity());
        assert_eq!(record.habitat_confidence, 0.0);
        assert_eq!(record.habitat_guess, "praia");
    }

    #[test]
    fn numeric_strings_are_parsed_and_garbage_is_zero() {
        let raw = obj(json!({
            "habitat_confidence": "0.75",
            "archaeology_confidence": "alta",
        }));
        let record = assemble_record(&raw, &Map::new(), identity());
        assert!((record.habitat_confidence - 0.75).abs() < 1e-6);
        assert_eq!(record.archaeology_confidence, 0.0);
    }

    #[test]
    fn confidences_are_not_clamped() {
        let raw = obj(json!({"habitat_confidence": 1.4}));
        let record = assemble_record(&raw, &Map::new(), identity());
        assert!((record.habitat_confidence - 1.4).abs() < 1e-6);
    }

    #[test]
    fn missing_fields_become_empty() {
        let record = assemble_record(&Map::new(), &Map::new(), identity());
        assert!(record.title.is_empty());
        assert!(record.species_candidates.is_empty());
        assert!(record.keywords.is_empty());
        assert!(record.archaeology_flags.is_empty());
        assert!(record.location_guess.is_none());
        assert!(record.technical_quality.is_none());
        assert_eq!(record.file_id, "img001");
        assert_eq!(record.original_filename, "img001.CR3");
    }

    #[test]
    fn malformed_species_items_get_defaults_and_scalars_are_skipped() {
        let raw = obj(json!({
            "species_candidates": [
                {"name_pt": "garça-branca", "confidence": 0.6, "taxonomy_level": "GENUS"},
                "gaivota",
                42,
                null,
                true,
                "  ",
                {"confidence": "x", "taxonomy_level": "kingdom"}
            ]
        }));
        let record = assemble_record(&raw, &Map::new(), identity());
        let species = &record.species_candidates;
        assert_eq!(species.len(), 3);
        assert_eq!(species[0].common_name, "garça-branca");
        assert_eq!(species[0].taxonomy_level, TaxonomyLevel::Genus);
        assert_eq!(species[1].common_name, "gaivota");
        assert_eq!(species[1].scientific_name, "");
        assert_eq!(species[2].common_name, "");
        assert_eq!(species[2].confidence, 0.0);
        assert_eq!(species[2].taxonomy_level, TaxonomyLevel::Species);
    }

    #[test]
    fn species_order_is_preserved() {
        let raw = obj(json!({
            "species_candidates": [
                {"name_pt": "a", "confidence": 0.2},
                {"name_pt": "b", "confidence": 0.9}
            ]
        }));
        let record = assemble_record(&raw, &Map::new(), identity());
        let names: Vec<_> = record
            .species_candidates
            .iter()
            .map(|s| s.common_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn keywords_deduplicated_in_first_occurrence_order() {
        let normalized = obj(json!({
            "keywords_normalized": ["bioma:praia", "clima:sol", "bioma:praia", "", "cores:azul"]
        }));
        let record = assemble_record(&Map::new(), &normalized, identity());
        assert_eq!(record.keywords, vec!["bioma:praia", "clima:sol", "cores:azul"]);
    }

    #[test]
    fn unknown_flags_and_quality_are_preserved() {
        let raw = obj(json!({
            "archaeology_flags": ["possible_sambaqui", "stone_wall"],
            "technical_quality": "grainy"
        }));
        let record = assemble_record(&raw, &Map::new(), identity());
        assert_eq!(record.archaeology_flags[0], ArchaeologyFlag::PossibleSambaqui);
        assert_eq!(record.archaeology_flags[1], ArchaeologyFlag::Other("stone_wall".into()));
        assert_eq!(record.technical_quality, Some(TechnicalQuality::Other("grainy".into())));
    }

    #[test]
    fn empty_technical_quality_is_absent() {
        let raw = obj(json!({"technical_quality": ""}));
        assert!(assemble_record(&raw, &Map::new(), identity())
            .technical_quality
            .is_none());
    }

    #[test]
    fn location_guess_with_coordinates() {
        let raw = obj(json!({
            "location_guess": {
                "description": "Baía da Babitonga",
                "confidence": 0.4,
                "evidence": "ponte ao fundo",
                "coordinates": {"lat": -26.2, "lon": -48.6}
            }
        }));
        let loc = assemble_record(&raw, &Map::new(), identity())
            .location_guess
            .unwrap();
        assert_eq!(loc.description, "Baía da Babitonga");
        assert_eq!(loc.coordinates, Some((-26.2, -48.6)));

        assert_eq!(parse_coordinates(&json!([-27.5, -48.5])), Some((-27.5, -48.5)));
        assert_eq!(
            parse_coordinates(&json!({"latitude": 1.0, "longitude": 2.0})),
            Some((1.0, 2.0))
        );
        assert_eq!(parse_coordinates(&json!("perto")), None);
    }

    #[test]
    fn null_or_string_location_is_ignored() {
        let raw = obj(json!({"location_guess": null}));
        assert!(assemble_record(&raw, &Map::new(), identity()).location_guess.is_none());
        let raw = obj(json!({"location_guess": "Joinville"}));
        assert!(assemble_record(&raw, &Map::new(), identity()).location_guess.is_none());
    }
}
