use crate::db::Storage;
use crate::error::Result;
use crate::playlists::{PlaylistSource, PlaylistSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlaylistCache {
    pub built_at: DateTime<Utc>,
    pub tracks: BTreeMap<String, Vec<PlaylistSummary>>,
}

impl PlaylistCache {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            built_at: now,
            tracks: BTreeMap::new(),
        }
    }

    /// Walks every playlist page by page. A playlist whose tracks cannot be
    /// listed is skipped; failing to list playlists at all is an error.
    pub fn rebuild<P>(source: &P, page_size: usize, now: DateTime<Utc>) -> Result<Self>
    where
        P: PlaylistSource + ?Sized,
    {
        let limit = page_size.max(1);
        let mut cache = Self::empty(now);
        let mut playlist_count = 0usize;

        let mut offset = 0;
        loop {
            let page = source.playlists(offset, limit)?;
            for playlist in &page.items {
                playlist_count += 1;
                if let Err(e) = cache.index_playlist(source, playlist, limit) {
                    warn!("Skipping playlist {} ({}): {}", playlist.name, playlist.id, e);
                }
            }
            match page.next {
                Some(next) if next > offset => offset = next,
                _ => break,
            }
        }

        info!(
            "Playlist cache rebuilt: {} playlists, {} tracks",
            playlist_count,
            cache.tracks.len()
        );
        Ok(cache)
    }

    fn index_playlist<P>(&mut self, source: &P, playlist: &PlaylistSummary, limit: usize) -> Result<()>
    where
        P: PlaylistSource + ?Sized,
    {
        let mut offset = 0;
        loop {
            let page = source.playlist_tracks(&playlist.id, offset, limit)?;
            for uri in page.items {
                self.note_added(&uri, playlist);
            }
            match page.next {
                Some(next) if next > offset => offset = next,
                _ => return Ok(()),
            }
        }
    }

    pub fn playlists_for_track(&self, uri: &str) -> &[PlaylistSummary] {
        self.tracks.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Records membership without a rebuild (e.g. after a successful sync).
    pub fn note_added(&mut self, uri: &str, playlist: &PlaylistSummary) {
        let entry = self.tracks.entry(uri.to_string()).or_default();
        if !entry.iter().any(|p| p.id == playlist.id) {
            entry.push(playlist.clone());
        }
    }

    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.built_at > ttl,
            Err(_) => false,
        }
    }

    /// Reads a previously saved cache. Undecodable data counts as no cache.
    pub fn load(storage: &dyn Storage, key: &str) -> Result<Option<Self>> {
        let Some(json) = storage.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(cache) => Ok(Some(cache)),
            Err(e) => {
                warn!("Discarding unreadable playlist cache: {}", e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, storage: &dyn Storage, key: &str) -> Result<()> {
        storage.set(key, &serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;
    use crate::error::Error;
    use crate::playlists::Page;
    use chrono::TimeZone;

    struct FakeSource {
        playlists: Vec<(PlaylistSummary, Vec<String>)>,
        broken: Option<String>,
    }

    impl FakeSource {
        fn new(lists: &[(&str, &[&str])]) -> Self {
            Self {
                playlists: lists
                    .iter()
                    .map(|(name, tracks)| {
                        (
                            PlaylistSummary {
                                id: name.to_lowercase(),
                                name: name.to_string(),
                            },
                            tracks.iter().map(|t| t.to_string()).collect(),
                        )
                    })
                    .collect(),
                broken: None,
            }
        }
    }

    impl PlaylistSource for FakeSource {
        fn playlists(&self, offset: usize, limit: usize) -> Result<Page<PlaylistSummary>> {
            let all: Vec<_> = self.playlists.iter().map(|(p, _)| p.clone()).collect();
            Ok(Page::slice(&all, offset, limit))
        }

        fn playlist_tracks(&self, playlist_id: &str, offset: usize, limit: usize) -> Result<Page<String>> {
            if self.broken.as_deref() == Some(playlist_id) {
                return Err(Error::Remote("HTTP 500".into()));
            }
            let (_, tracks) = self
                .playlists
                .iter()
                .find(|(p, _)| p.id == playlist_id)
                .ok_or_else(|| Error::NotFound(playlist_id.to_string()))?;
            Ok(Page::slice(tracks, offset, limit))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn names(cache: &PlaylistCache, uri: &str) -> Vec<String> {
        cache
            .playlists_for_track(uri)
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    #[test]
    fn rebuild_spans_multiple_pages() {
        let source = FakeSource::new(&[
            ("Warmup", &["t:1", "t:2", "t:3"][..]),
            ("Peak", &["t:2"][..]),
            ("Closing", &["t:3", "t:2"][..]),
        ]);
        let cache = PlaylistCache::rebuild(&source, 2, now()).unwrap();
        assert_eq!(names(&cache, "t:2"), ["Warmup", "Peak", "Closing"]);
        assert_eq!(names(&cache, "t:1"), ["Warmup"]);
        assert!(cache.playlists_for_track("t:9").is_empty());
    }

    #[test]
    fn broken_playlist_is_skipped() {
        let mut source = FakeSource::new(&[("Warmup", &["t:1"][..]), ("Peak", &["t:1", "t:2"][..])]);
        source.broken = Some("peak".into());
        let cache = PlaylistCache::rebuild(&source, 10, now()).unwrap();
        assert_eq!(names(&cache, "t:1"), ["Warmup"]);
        assert!(cache.playlists_for_track("t:2").is_empty());
    }

    #[test]
    fn note_added_deduplicates() {
        let mut cache = PlaylistCache::empty(now());
        let tagged = PlaylistSummary {
            id: "tagged".into(),
            name: "Tagged Tracks".into(),
        };
        cache.note_added("t:1", &tagged);
        cache.note_added("t:1", &tagged);
        assert_eq!(cache.playlists_for_track("t:1").len(), 1);
    }

    #[test]
    fn staleness_uses_ttl() {
        let cache = PlaylistCache::empty(now());
        let ttl = Duration::from_secs(3600);
        assert!(!cache.is_stale(ttl, now() + chrono::Duration::minutes(59)));
        assert!(cache.is_stale(ttl, now() + chrono::Duration::minutes(61)));
    }

    #[test]
    fn save_and_load() {
        let storage = MemoryStorage::new();
        assert!(PlaylistCache::load(&storage, "cache").unwrap().is_none());

        let source = FakeSource::new(&[("Warmup", &["t:1"][..])]);
        let cache = PlaylistCache::rebuild(&source, 5, now()).unwrap();
        cache.save(&storage, "cache").unwrap();
        assert_eq!(PlaylistCache::load(&storage, "cache").unwrap(), Some(cache));

        storage.set("cache", "garbage").unwrap();
        assert!(PlaylistCache::load(&storage, "cache").unwrap().is_none());
    }
}
