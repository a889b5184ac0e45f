use crate::db::Storage;
use crate::error::{Error, Result};
use crate::slug::{slugify, uniquify};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
}

/// One page of a paginated listing. `next` is the offset of the following
/// page, `None` on the last one.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<usize>,
}

impl<T: Clone> Page<T> {
    /// Slices `all` into the page starting at `offset`.
    pub fn slice(all: &[T], offset: usize, limit: usize) -> Self {
        let limit = limit.max(1);
        let end = offset.saturating_add(limit).min(all.len());
        let items = all.get(offset..end).map(<[T]>::to_vec).unwrap_or_default();
        Page {
            items,
            next: (end < all.len()).then_some(end),
        }
    }
}

pub trait PlaylistSource {
    fn playlists(&self, offset: usize, limit: usize) -> Result<Page<PlaylistSummary>>;
    fn playlist_tracks(&self, playlist_id: &str, offset: usize, limit: usize) -> Result<Page<String>>;
}

/// Target of the "add newly tagged track" side effect.
pub trait PlaylistSync {
    /// Adds `uri` to the playlist called `playlist_name`, creating it if
    /// needed. Adding a track that is already there is not an error.
    fn add_to_playlist(&self, playlist_name: &str, uri: &str) -> Result<PlaylistSummary>;
}

pub trait TempoSource {
    /// Best-effort tempo lookup; `None` on any failure.
    fn fetch_tempo(&self, uri: &str) -> Option<f64>;
}

/// Tempo source for setups without an audio-features provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTempo;

impl TempoSource for NoTempo {
    fn fetch_tempo(&self, _uri: &str) -> Option<f64> {
        None
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LocalPlaylist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Named playlists kept as one JSON list in key/value storage.
pub struct LocalPlaylists<S: Storage> {
    storage: S,
    key: String,
}

impl<S: Storage> LocalPlaylists<S> {
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn all(&self) -> Result<Vec<LocalPlaylist>> {
        match self.storage.get(&self.key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, playlists: &[LocalPlaylist]) -> Result<()> {
        self.storage.set(&self.key, &serde_json::to_string(playlists)?)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<LocalPlaylist>> {
        Ok(self.all()?.into_iter().find(|p| p.name == name))
    }

    pub fn add_track_to_playlist(&self, playlist_name: &str, uri: &str) -> Result<PlaylistSummary> {
        let mut playlists = self.all()?;
        let index = match playlists.iter().position(|p| p.name == playlist_name) {
            Some(i) => i,
            None => {
                let id = uniquify(&slugify(playlist_name), playlists.iter().map(|p| p.id.as_str()));
                playlists.push(LocalPlaylist {
                    id,
                    name: playlist_name.to_string(),
                    tracks: Vec::new(),
                });
                playlists.len() - 1
            }
        };

        let playlist = &mut playlists[index];
        if !playlist.tracks.iter().any(|t| t == uri) {
            playlist.tracks.push(uri.to_string());
            debug!("Added {} to playlist {}", uri, playlist.name);
        }
        let summary = PlaylistSummary {
            id: playlist.id.clone(),
            name: playlist.name.clone(),
        };
        self.save(&playlists)?;
        Ok(summary)
    }
}

impl<S: Storage> PlaylistSync for LocalPlaylists<S> {
    fn add_to_playlist(&self, playlist_name: &str, uri: &str) -> Result<PlaylistSummary> {
        self.add_track_to_playlist(playlist_name, uri)
    }
}

impl<S: Storage> PlaylistSource for LocalPlaylists<S> {
    fn playlists(&self, offset: usize, limit: usize) -> Result<Page<PlaylistSummary>> {
        let summaries: Vec<PlaylistSummary> = self
            .all()?
            .into_iter()
            .map(|p| PlaylistSummary { id: p.id, name: p.name })
            .collect();
        Ok(Page::slice(&summaries, offset, limit))
    }

    fn playlist_tracks(&self, playlist_id: &str, offset: usize, limit: usize) -> Result<Page<String>> {
        let playlist = self
            .all()?
            .into_iter()
            .find(|p| p.id == playlist_id)
            .ok_or_else(|| Error::NotFound(format!("playlist {}", playlist_id)))?;
        Ok(Page::slice(&playlist.tracks, offset, limit))
    }
}
