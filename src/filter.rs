use crate::models::{TrackRecord, TrackTagRef};
use crate::store::AnnotationStore;
use crate::taxonomy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Track must carry every included tag.
    #[default]
    All,
    /// Track must carry at least one included tag.
    Any,
}

#[derive(Debug, Clone, Default)]
pub struct TrackFilter {
    pub include: Vec<TrackTagRef>,
    pub exclude: Vec<TrackTagRef>,
    pub mode: MatchMode,
    pub min_rating: Option<u8>,
    pub energy: Option<(u8, u8)>,
    pub bpm: Option<(f64, f64)>,
}

impl TrackFilter {
    pub fn matches(&self, record: &TrackRecord) -> bool {
        if self.exclude.iter().any(|t| record.has_tag(t)) {
            return false;
        }
        if !self.include.is_empty() {
            let hit = match self.mode {
                MatchMode::All => self.include.iter().all(|t| record.has_tag(t)),
                MatchMode::Any => self.include.iter().any(|t| record.has_tag(t)),
            };
            if !hit {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if record.rating < min {
                return false;
            }
        }
        if let Some((lo, hi)) = self.energy {
            if record.energy < lo || record.energy > hi {
                return false;
            }
        }
        if let Some((lo, hi)) = self.bpm {
            // Tracks without a tempo never satisfy a tempo range
            match record.bpm {
                Some(bpm) if bpm >= lo && bpm <= hi => {}
                _ => return false,
            }
        }
        true
    }
}

/// Uris of matching tracks, in uri order.
pub fn filter_tracks(store: &AnnotationStore, filter: &TrackFilter) -> Vec<String> {
    store
        .tracks()
        .iter()
        .filter(|(_, record)| filter.matches(record))
        .map(|(uri, _)| uri.clone())
        .collect()
}

/// Number of tracks using each tag, in taxonomy order. Unused tags are listed with 0.
pub fn tag_usage_counts(store: &AnnotationStore) -> Vec<(TrackTagRef, usize)> {
    taxonomy::all_tag_refs(store.categories())
        .into_iter()
        .map(|tag| {
            let count = store.tracks().values().filter(|r| r.has_tag(&tag)).count();
            (tag, count)
        })
        .collect()
}
