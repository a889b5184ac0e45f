use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_RATING: u8 = 5;
pub const MAX_ENERGY: u8 = 10;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subcategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

/// Reference from a track into the taxonomy, by id triple.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct TrackTagRef {
    pub category_id: String,
    pub subcategory_id: String,
    pub tag_id: String,
}

impl TrackTagRef {
    pub fn new(
        category_id: impl Into<String>,
        subcategory_id: impl Into<String>,
        tag_id: impl Into<String>,
    ) -> Self {
        Self {
            category_id: category_id.into(),
            subcategory_id: subcategory_id.into(),
            tag_id: tag_id.into(),
        }
    }

    /// Parses the `category/subcategory/tag` form used on the command line.
    pub fn parse_path(path: &str) -> Option<Self> {
        let mut parts = path.split('/');
        let (c, s, t) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || c.is_empty() || s.is_empty() || t.is_empty() {
            return None;
        }
        Some(Self::new(c, s, t))
    }
}

impl std::fmt::Display for TrackTagRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.category_id, self.subcategory_id, self.tag_id)
    }
}

/// Per-track annotation. `rating == 0` and `energy == 0` mean "unset".
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TrackRecord {
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub energy: u8,
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub tags: Vec<TrackTagRef>,
}

impl TrackRecord {
    /// A record with no rating, no energy and no tags is never stored.
    ///
    /// `bpm` does not count: a record holding only a tempo is still empty.
    pub fn is_empty(&self) -> bool {
        self.rating == 0 && self.energy == 0 && self.tags.is_empty()
    }

    pub fn has_tag(&self, tag: &TrackTagRef) -> bool {
        self.tags.contains(tag)
    }

    /// Drops repeated id triples, keeping first occurrence order.
    pub fn dedup_tags(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.tags.retain(|t| seen.insert(t.clone()));
    }
}

/// The persisted document: taxonomy plus the track map.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct AnnotationDocument {
    pub categories: Vec<Category>,
    pub tracks: BTreeMap<String, TrackRecord>,
}

/// Short track id: the last segment of a `scheme:kind:id` or path-like uri.
pub fn track_id_from_uri(uri: &str) -> &str {
    uri.rsplit(|c: char| c == ':' || c == '/')
        .find(|s| !s.is_empty())
        .unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_ignores_bpm() {
        let record = TrackRecord {
            bpm: Some(128.0),
            ..Default::default()
        };
        assert!(record.is_empty());

        let rated = TrackRecord {
            rating: 3,
            ..Default::default()
        };
        assert!(!rated.is_empty());
    }

    #[test]
    fn track_ref_serializes_camel_case() {
        let json = serde_json::to_value(TrackTagRef::new("genre", "house", "deep")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"categoryId": "genre", "subcategoryId": "house", "tagId": "deep"})
        );
    }

    #[test]
    fn parse_path_requires_three_segments() {
        assert_eq!(
            TrackTagRef::parse_path("genre/house/deep"),
            Some(TrackTagRef::new("genre", "house", "deep"))
        );
        assert_eq!(TrackTagRef::parse_path("genre/house"), None);
        assert_eq!(TrackTagRef::parse_path("genre//deep"), None);
        assert_eq!(TrackTagRef::parse_path("a/b/c/d"), None);
    }

    #[test]
    fn track_id_is_last_uri_segment() {
        assert_eq!(track_id_from_uri("spotify:track:4uLU6hMCjMI75M1A2tKUQC"), "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(track_id_from_uri("https://open.example/track/abc/"), "abc");
        assert_eq!(track_id_from_uri("plain"), "plain");
    }

    #[test]
    fn record_defaults_missing_fields() {
        let record: TrackRecord = serde_json::from_str(r#"{"rating": 4}"#).unwrap();
        assert_eq!(record.rating, 4);
        assert_eq!(record.energy, 0);
        assert_eq!(record.bpm, None);
        assert!(record.tags.is_empty());
    }
}
