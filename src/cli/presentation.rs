//! CLI presentation: text and json formatters.

use crate::coordinator::SaveOutcome;
use crate::document::Document;
use serde_json::json;

pub fn format_document_text(doc: &Document) -> String {
    let revision = doc
        .revision()
        .map_or_else(|| "-".to_string(), |r| r.to_string());
    let body = serde_json::to_string_pretty(doc.properties()).unwrap_or_else(|_| "{}".to_string());
    format!(
        "id: {}\nrevision: {}\nsequence: {}\n{}",
        doc.id(),
        revision,
        doc.sequence(),
        body
    )
}

pub fn format_document_json(doc: &Document) -> String {
    json!({
        "id": doc.id().as_str(),
        "revision": doc.revision().map(|r| r.to_string()),
        "sequence": doc.sequence(),
        "properties": doc.properties(),
    })
    .to_string()
}

pub fn format_save_outcome(id: &str, outcome: &SaveOutcome) -> String {
    match outcome {
        SaveOutcome::Unchanged => format!("{}: unchanged", id),
        SaveOutcome::Committed { revision, sequence } => {
            format!("{}: committed {} (sequence {})", id, revision, sequence)
        }
        SaveOutcome::Merged { revision, sequence } => {
            format!("{}: merged {} (sequence {})", id, revision, sequence)
        }
        SaveOutcome::Adopted { revision, sequence } => format!(
            "{}: kept stored revision {} (sequence {})",
            id, revision, sequence
        ),
    }
}
