use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::enums::{ArchaeologyFlag, SourceTag, TaxonomyLevel, TechnicalQuality};

/// One hypothesized taxon for an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesCandidate {
    #[serde(rename = "name_pt")]
    pub common_name: String,
    #[serde(rename = "name_scientific")]
    pub scientific_name: String,
    /// 0.0 - 1.0, as reported by the model.
    pub confidence: f32,
    /// Visible morphological cues.
    pub evidence: String,
    #[serde(default = "default_taxonomy", deserialize_with = "lenient_taxonomy")]
    pub taxonomy_level: TaxonomyLevel,
}

/// Estimated location, only present when the raw pass reports one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationGuess {
    pub description: String,
    pub confidence: f32,
    pub evidence: String,
    /// (latitude, longitude)
    #[serde(default)]
    pub coordinates: Option<(f64, f64)>,
}

/// Finished metadata for one processed image.
///
/// Built only by the extraction engine's assembly step, so every field is
/// populated (possibly with defaults) before a sink ever sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// File path or remote storage id.
    pub file_id: String,
    pub source: SourceTag,
    pub original_filename: String,

    pub title: String,
    pub description_short: String,
    pub description_long: String,

    pub habitat_guess: String,
    pub habitat_confidence: f32,
    pub habitat_evidence: String,

    /// Model emission order, never re-sorted.
    #[serde(default)]
    pub species_candidates: Vec<SpeciesCandidate>,

    #[serde(default)]
    pub archaeology_flags: Vec<ArchaeologyFlag>,
    #[serde(default)]
    pub archaeology_evidence: String,
    #[serde(default)]
    pub archaeology_confidence: f32,

    /// Hierarchical `category:value` keywords.
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub location_guess: Option<LocationGuess>,

    #[serde(default)]
    pub activities: Vec<String>,

    #[serde(default, deserialize_with = "lenient_quality")]
    pub technical_quality: Option<TechnicalQuality>,

    #[serde(deserialize_with = "lenient_timestamp")]
    pub processing_timestamp: DateTime<Utc>,
}

/// Accepts RFC 3339 and the offset-less ISO form (`2025-11-03T14:22:05.123`)
/// written by older tooling, read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let s = String::deserialize(d)?;
    parse_timestamp(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid processing_timestamp '{s}'")))
}

// Older manifests store a missing quality as "".
fn lenient_quality<'de, D: Deserializer<'de>>(d: D) -> Result<Option<TechnicalQuality>, D::Error> {
    let s = Option::<String>::deserialize(d)?;
    Ok(s.filter(|q| !q.trim().is_empty()).map(TechnicalQuality::from))
}

fn default_taxonomy() -> TaxonomyLevel {
    TaxonomyLevel::Species
}

fn lenient_taxonomy<'de, D: Deserializer<'de>>(d: D) -> Result<TaxonomyLevel, D::Error> {
    let s = Option::<String>::deserialize(d)?;
    Ok(TaxonomyLevel::parse_lenient(s.as_deref().unwrap_or_default()))
}

impl MetadataRecord {
    /// Plain mapping view of the record, as written into the manifest.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            // A struct of strings, numbers and lists always serializes to an object.
            _ => serde_json::Map::new(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample_record;
    use super::*;

    #[test]
    fn mapping_uses_manifest_field_names() {
        let map = sample_record().to_map();
        assert_eq!(map["file_id"], "/photos/img001.CR3");
        assert_eq!(map["source"], "lightroom");
        assert_eq!(map["species_candidates"][0]["name_pt"], "caranguejo-uçá");
        assert_eq!(map["species_candidates"][0]["name_scientific"], "Ucides cordatus");
        assert_eq!(map["species_candidates"][1]["taxonomy_level"], "family");
        assert_eq!(map["archaeology_flags"][0], "shell_accumulation");
        assert_eq!(map["technical_quality"], "sharp");
        assert!(map["location_guess"].is_null());
        assert!(map["processing_timestamp"]
            .as_str()
            .unwrap()
            .starts_with("2026-03-01T12:00:00"));
    }

    #[test]
    fn record_deserializes_from_its_own_mapping() {
        let record = sample_record();
        let value = serde_json::Value::Object(record.to_map());
        let back: MetadataRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn offset_less_timestamps_read_as_utc() {
        let ts = parse_timestamp("2025-11-03T14:22:05.123456").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-11-03T14:22:05.123456+00:00");
        assert!(parse_timestamp("2026-03-01T12:00:00Z").is_some());
        assert!(parse_timestamp("ontem").is_none());
    }

    #[test]
    fn older_record_shape_is_accepted() {
        let mut map = sample_record().to_map();
        map.insert("processing_timestamp".into(), "2025-11-03T14:22:05.123456".into());
        map.insert("technical_quality".into(), "".into());
        map.remove("archaeology_confidence");
        map["species_candidates"][0]["taxonomy_level"] = "subspecies".into();

        let record: MetadataRecord = serde_json::from_value(serde_json::Value::Object(map)).unwrap();
        assert_eq!(record.technical_quality, None);
        assert_eq!(record.archaeology_confidence, 0.0);
        assert_eq!(record.species_candidates[0].taxonomy_level, TaxonomyLevel::Species);
        assert_eq!(record.processing_timestamp.to_rfc3339(), "2025-11-03T14:22:05.123456+00:00");
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        let mut map = sample_record().to_map();
        map.insert("processing_timestamp".into(), "ontem".into());
        assert!(serde_json::from_value::<MetadataRecord>(serde_json::Value::Object(map)).is_err());
    }
}
