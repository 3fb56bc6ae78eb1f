//! Human-readable description text written by the sinks.
//!
//! Only facts that clear the confidence thresholds are shown.

use crate::config::APP_VERSION;
use crate::models::MetadataRecord;
use crate::pipeline::extraction::ConfidenceThresholds;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const TOP_SPECIES: usize = 3;
const DRIVE_KEYWORDS_SHOWN: usize = 25;
const KEYWORD_LINE_WIDTH: usize = 77;

fn percent(confidence: f32) -> String {
    format!("{:.0}%", confidence * 100.0)
}

fn joined<T: AsRef<str>>(items: &[T]) -> String {
    items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
}

/// Text for the Google Drive `description` field.
pub fn format_for_drive(record: &MetadataRecord, thresholds: &ConfidenceThresholds) -> String {
    let mut lines = vec![
        record.description_long.clone(),
        String::new(),
        RULE.to_string(),
        String::new(),
    ];

    match thresholds.surfaced_habitat(record) {
        Some(habitat) => {
            lines.push(format!("🌿 HABITAT: {habitat}"));
            lines.push(format!("   Confiança: {}", percent(record.habitat_confidence)));
            if !record.habitat_evidence.is_empty() {
                lines.push(format!("   {}", record.habitat_evidence));
            }
        }
        None => lines.push(format!(
            "🌿 HABITAT: indeterminado (confiança {})",
            percent(record.habitat_confidence)
        )),
    }
    lines.push(String::new());

    let species = thresholds.surfaced_species(record);
    if !species.is_empty() {
        lines.push("🔬 ESPÉCIES IDENTIFICADAS:".to_string());
        for sp in species.iter().take(TOP_SPECIES) {
            lines.push(format!("   • {}", sp.common_name));
            if !sp.scientific_name.is_empty() {
                lines.push(format!("     ({})", sp.scientific_name));
            }
            lines.push(format!("     Confiança: {}", percent(sp.confidence)));
            if !sp.evidence.is_empty() {
                lines.push(format!("     {}", sp.evidence));
            }
            lines.push(String::new());
        }
    }

    let flags = thresholds.surfaced_archaeology(record);
    if !flags.is_empty() {
        lines.push("🏛️  ARQUEOLOGIA:".to_string());
        lines.push(format!(
            "   {}",
            flags.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
        ));
        if !record.archaeology_evidence.is_empty() {
            lines.push(format!("   {}", record.archaeology_evidence));
        }
        lines.push(String::new());
    }

    if !record.activities.is_empty() {
        lines.push("👥 ATIVIDADES OBSERVADAS:".to_string());
        lines.push(format!("   {}", joined(&record.activities)));
        lines.push(String::new());
    }

    lines.push("🏷️  PALAVRAS-CHAVE:".to_string());
    lines.extend(wrap_keywords(
        &record.keywords[..record.keywords.len().min(DRIVE_KEYWORDS_SHOWN)],
    ));
    if record.keywords.len() > DRIVE_KEYWORDS_SHOWN {
        lines.push(format!(
            "   ... e mais {} keywords",
            record.keywords.len() - DRIVE_KEYWORDS_SHOWN
        ));
    }

    lines.push(String::new());
    lines.push(RULE.to_string());
    lines.push(format!(
        "Processado automaticamente em {}",
        record.processing_timestamp.to_rfc3339()
    ));
    lines.push(format!("Sistema: Acquaplan Tagger v{APP_VERSION}"));

    lines.join("\n")
}

/// Indented, comma-separated keyword lines of at most ~80 columns.
fn wrap_keywords(keywords: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::from("   ");
    for kw in keywords {
        if current.len() > 3 && current.len() + kw.len() > KEYWORD_LINE_WIDTH {
            lines.push(current.trim_end_matches([',', ' ']).to_string());
            current = String::from("   ");
        }
        current.push_str(kw);
        current.push_str(", ");
    }
    if !current.trim().is_empty() {
        lines.push(current.trim_end_matches([',', ' ']).to_string());
    }
    lines
}

/// Long description embedded in `XMP-dc:Description`.
pub fn format_for_xmp(record: &MetadataRecord, thresholds: &ConfidenceThresholds) -> String {
    let mut parts = vec![record.description_long.clone(), String::new()];

    if let Some(habitat) = thresholds.surfaced_habitat(record) {
        parts.push(format!(
            "Habitat: {habitat} (confiança: {})",
            percent(record.habitat_confidence)
        ));
        parts.push(format!("Evidência: {}", record.habitat_evidence));
    }

    let species = thresholds.surfaced_species(record);
    if !species.is_empty() {
        parts.push(String::new());
        parts.push("Espécies identificadas:".to_string());
        for sp in species.iter().take(TOP_SPECIES) {
            parts.push(format!(
                "  • {} ({}) - {}",
                sp.common_name,
                sp.scientific_name,
                percent(sp.confidence)
            ));
        }
    }

    let flags = thresholds.surfaced_archaeology(record);
    if !flags.is_empty() {
        parts.push(String::new());
        parts.push(format!(
            "Arqueologia: {}",
            flags.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
        ));
        if !record.archaeology_evidence.is_empty() {
            parts.push(format!("  {}", record.archaeology_evidence));
        }
    }

    if !record.activities.is_empty() {
        parts.push(String::new());
        parts.push(format!("Atividades: {}", joined(&record.activities)));
    }

    parts.join("\n")
}
