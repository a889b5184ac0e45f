use crate::error::{Error, Result};
use crate::models::{track_id_from_uri, AnnotationDocument, TrackRecord};
use crate::store::AnnotationStore;
use crate::taxonomy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const EXPORT_VERSION: &str = "1.0";

/// Separator between the BPM, energy and tag segments of the comment.
const COMMENT_SEPARATOR: &str = " - ";

/// Full store as a pretty-printed backup document.
pub fn export_backup(store: &AnnotationStore) -> Result<String> {
    Ok(serde_json::to_string_pretty(store.document())?)
}

/// Decodes a backup file, checking the top-level shape first so a wrong
/// file gets a useful message instead of a serde path.
pub fn parse_backup(json: &str) -> Result<AnnotationDocument> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| Error::InvalidBackup(format!("not valid JSON: {}", e)))?;

    let Value::Object(root) = &value else {
        return Err(Error::InvalidBackup("top level is not an object".into()));
    };
    match root.get("categories") {
        Some(Value::Array(_)) => {}
        Some(_) => return Err(Error::InvalidBackup("`categories` is not an array".into())),
        None => return Err(Error::InvalidBackup("missing `categories`".into())),
    }
    match root.get("tracks") {
        Some(Value::Object(_)) => {}
        Some(_) => return Err(Error::InvalidBackup("`tracks` is not an object".into())),
        None => return Err(Error::InvalidBackup("missing `tracks`".into())),
    }

    serde_json::from_value(value).map_err(|e| Error::InvalidBackup(e.to_string()))
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedTag {
    pub category_id: String,
    pub subcategory_id: String,
    pub tag_id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExportedTrack {
    pub rating: u8,
    pub energy: u8,
    pub bpm: Option<f64>,
    pub tags: Vec<ExportedTag>,
    pub rekordbox_comment: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExportDocument {
    pub version: String,
    pub exported_at: String,
    pub tracks: BTreeMap<String, ExportedTrack>,
}

/// Builds the export keyed by short track id. Empty records are skipped and
/// tag references that no longer resolve are left out of the tag list.
pub fn export_data(store: &AnnotationStore, exported_at: DateTime<Utc>) -> ExportDocument {
    let mut tracks = BTreeMap::new();

    for (uri, record) in store.tracks() {
        if record.is_empty() {
            continue;
        }
        let tags: Vec<ExportedTag> = record
            .tags
            .iter()
            .filter_map(|tag| {
                let name = taxonomy::tag_name(store.categories(), tag)?;
                Some(ExportedTag {
                    category_id: tag.category_id.clone(),
                    subcategory_id: tag.subcategory_id.clone(),
                    tag_id: tag.tag_id.clone(),
                    name: name.to_string(),
                })
            })
            .collect();

        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        tracks.insert(
            track_id_from_uri(uri).to_string(),
            ExportedTrack {
                rating: record.rating,
                energy: record.energy,
                bpm: record.bpm,
                rekordbox_comment: format_comment(record, &names),
                tags,
            },
        );
    }

    ExportDocument {
        version: EXPORT_VERSION.to_string(),
        exported_at: exported_at.to_rfc3339(),
        tracks,
    }
}

/// `BPM 120 - Energy 7 - Deep, Afro`, with absent segments left out.
pub fn format_comment(record: &TrackRecord, tag_names: &[&str]) -> String {
    let mut segments = Vec::with_capacity(3);
    if let Some(bpm) = record.bpm {
        segments.push(format!("BPM {}", bpm));
    }
    if record.energy > 0 {
        segments.push(format!("Energy {}", record.energy));
    }
    if !tag_names.is_empty() {
        segments.push(tag_names.join(", "));
    }
    segments.join(COMMENT_SEPARATOR)
}
