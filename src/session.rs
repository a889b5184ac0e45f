use crate::config::Config;
use crate::db::Storage;
use crate::deferred::{Clock, DeferredTasks};
use crate::error::Result;
use crate::export::{self, ExportDocument};
use crate::models::AnnotationDocument;
use crate::playlist_cache::PlaylistCache;
use crate::playlists::{NoTempo, PlaylistSync, TempoSource};
use crate::store::{presence_changes, Applied, AnnotationStore, Operation, TrackTransition};
use crate::undo::UndoStack;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub storage_key: String,
    pub save_debounce: Duration,
    pub playlist_sync_delay: Duration,
    pub tagged_playlist_name: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions::from(&Config::default())
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            storage_key: config.storage_key.clone(),
            save_debounce: config.save_debounce(),
            playlist_sync_delay: config.playlist_sync_delay(),
            tagged_playlist_name: config.tagged_playlist_name.clone(),
        }
    }
}

/// How the persisted document looked when the session started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A stored document was decoded.
    Loaded,
    /// Nothing was stored; the default taxonomy was seeded and written.
    Seeded,
    /// The stored value could not be read or decoded. Defaults are in use and
    /// the stored value is left alone until the next mutation.
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SaveTask;

/// Never sleeps or spawns: the owner calls `tick` from its loop and `finish`
/// before exiting.
pub struct TagSession {
    store: AnnotationStore,
    storage: Box<dyn Storage>,
    clock: Box<dyn Clock>,
    playlist_sync: Option<Box<dyn PlaylistSync>>,
    tempo: Box<dyn TempoSource>,
    playlist_cache: Option<PlaylistCache>,
    options: SessionOptions,
    save: DeferredTasks<SaveTask>,
    playlist_adds: DeferredTasks<String>,
    tempo_queue: Vec<String>,
    undo: UndoStack,
    load_outcome: LoadOutcome,
    /// Store differs from what was last written.
    dirty: bool,
}

impl TagSession {
    /// Reads the stored document, seeding the default taxonomy on first run.
    pub fn load(storage: Box<dyn Storage>, clock: Box<dyn Clock>, options: SessionOptions) -> Self {
        let (store, load_outcome) = match storage.get(&options.storage_key) {
            Ok(Some(json)) => match serde_json::from_str::<AnnotationDocument>(&json) {
                Ok(doc) => {
                    let store = AnnotationStore::from_document(doc);
                    info!(
                        "Loaded {} categories and {} tracks",
                        store.categories().len(),
                        store.tracks().len()
                    );
                    (store, LoadOutcome::Loaded)
                }
                Err(e) => {
                    warn!("Stored tag data is unreadable, starting from defaults: {}", e);
                    (AnnotationStore::seeded(), LoadOutcome::Recovered)
                }
            },
            Ok(None) => (AnnotationStore::seeded(), LoadOutcome::Seeded),
            Err(e) => {
                warn!("Failed to read tag data, starting from defaults: {}", e);
                (AnnotationStore::seeded(), LoadOutcome::Recovered)
            }
        };

        let mut session = Self {
            store,
            storage,
            clock,
            playlist_sync: None,
            tempo: Box::new(NoTempo),
            playlist_cache: None,
            options,
            save: DeferredTasks::new(),
            playlist_adds: DeferredTasks::new(),
            tempo_queue: Vec::new(),
            undo: UndoStack::new(),
            load_outcome,
            dirty: false,
        };

        if load_outcome == LoadOutcome::Seeded {
            info!("No tag data found, seeding default taxonomy");
            session.dirty = true;
            session.flush();
        }
        session
    }

    pub fn with_playlist_sync(mut self, sync: Box<dyn PlaylistSync>) -> Self {
        self.playlist_sync = Some(sync);
        self
    }

    pub fn with_tempo_source(mut self, tempo: Box<dyn TempoSource>) -> Self {
        self.tempo = tempo;
        self
    }

    /// Cache to keep current when the session adds tracks to the tagged playlist.
    pub fn with_playlist_cache(mut self, cache: PlaylistCache) -> Self {
        self.playlist_cache = Some(cache);
        self
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn load_outcome(&self) -> LoadOutcome {
        self.load_outcome
    }

    pub fn playlist_cache(&self) -> Option<&PlaylistCache> {
        self.playlist_cache.as_ref()
    }

    pub fn set_playlist_cache(&mut self, cache: PlaylistCache) {
        self.playlist_cache = Some(cache);
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Applies `op`, records it for undo and schedules the side effects its
    /// presence edges call for.
    pub fn apply(&mut self, op: Operation) -> Applied {
        let label = op.label();
        let before = self.store.clone();
        let applied = self.store.apply(op);
        if applied.changed {
            self.undo.push(label, before);
            self.on_transitions(&applied.transitions);
            self.mark_dirty();
        }
        applied
    }

    pub fn undo(&mut self) -> Option<String> {
        let (message, snapshot) = self.undo.undo(&self.store)?;
        self.install(snapshot);
        info!("{}", message);
        Some(message)
    }

    pub fn redo(&mut self) -> Option<String> {
        let (message, snapshot) = self.undo.redo(&self.store)?;
        self.install(snapshot);
        info!("{}", message);
        Some(message)
    }

    fn install(&mut self, snapshot: AnnotationStore) {
        let transitions = presence_changes(&self.store, &snapshot);
        self.store = snapshot;
        self.on_transitions(&transitions);
        self.mark_dirty();
    }

    pub fn export_backup(&self) -> Result<String> {
        export::export_backup(&self.store)
    }

    /// Validates `json` and, only if it is a well-formed backup, replaces the
    /// whole store with it. Imported tracks are not queued for playlist adds
    /// or tempo lookups, and the undo history starts over.
    pub fn import_backup(&mut self, json: &str) -> Result<Applied> {
        let doc = export::parse_backup(json)?;
        let applied = self.store.apply(Operation::Replace(doc));
        let removed: Vec<TrackTransition> = applied
            .transitions
            .iter()
            .filter(|t| matches!(t, TrackTransition::Removed(_)))
            .cloned()
            .collect();
        self.on_transitions(&removed);
        self.undo.clear();
        self.mark_dirty();
        info!(
            "Imported backup: {} categories, {} tracks",
            self.store.categories().len(),
            self.store.tracks().len()
        );
        Ok(applied)
    }

    pub fn export_data(&self) -> ExportDocument {
        export::export_data(&self.store, chrono::Utc::now())
    }

    fn on_transitions(&mut self, transitions: &[TrackTransition]) {
        let now = self.clock.now();
        for transition in transitions {
            match transition {
                TrackTransition::Created(uri) => {
                    self.playlist_adds
                        .schedule(uri.clone(), now + self.options.playlist_sync_delay);
                    let needs_tempo = self.store.track(uri).is_some_and(|r| r.bpm.is_none());
                    if needs_tempo && !self.tempo_queue.contains(uri) {
                        self.tempo_queue.push(uri.clone());
                    }
                }
                TrackTransition::Removed(uri) => {
                    if self.playlist_adds.cancel(uri) {
                        debug!("Cancelled pending playlist add for {}", uri);
                    }
                    self.tempo_queue.retain(|u| u != uri);
                }
            }
        }
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        let at = self.clock.now() + self.options.save_debounce;
        self.save.schedule(SaveTask, at);
    }

    pub fn is_save_pending(&self) -> bool {
        self.save.is_pending(&SaveTask)
    }

    pub fn is_playlist_add_pending(&self, uri: &str) -> bool {
        self.playlist_adds.is_pending(&uri.to_string())
    }

    pub fn pending_tempo_lookups(&self) -> &[String] {
        &self.tempo_queue
    }

    /// Earliest moment at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let save = self.save.next_deadline();
        let adds = self.playlist_adds.next_deadline();
        match (save, adds) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Runs whatever is due: tempo lookups, playlist adds, then the save.
    pub fn tick(&mut self) {
        self.run_tempo_lookups();

        let now = self.clock.now();
        let due = self.playlist_adds.take_due(now);
        self.run_playlist_adds(due);

        if !self.save.take_due(self.clock.now()).is_empty() {
            self.flush();
        }
    }

    /// Runs everything still pending regardless of deadlines and writes the
    /// store if it changed. Returns whether the store is saved.
    pub fn finish(&mut self) -> bool {
        self.run_tempo_lookups();
        let pending = self.playlist_adds.drain();
        self.run_playlist_adds(pending);
        self.save.cancel(&SaveTask);
        if !self.dirty {
            return true;
        }
        self.flush()
    }

    /// Writes the store now. A failed write is logged and leaves the in-memory
    /// state as the source of truth.
    pub fn flush(&mut self) -> bool {
        self.save.cancel(&SaveTask);
        let json = match serde_json::to_string(self.store.document()) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode tag data: {}", e);
                return false;
            }
        };
        match self.storage.set(&self.options.storage_key, &json) {
            Ok(()) => {
                debug!("Saved tag data ({} bytes)", json.len());
                self.dirty = false;
                true
            }
            Err(e) => {
                warn!(key = %self.options.storage_key, "Failed to save tag data: {}", e);
                false
            }
        }
    }

    fn run_tempo_lookups(&mut self) {
        for uri in std::mem::take(&mut self.tempo_queue) {
            let still_missing = self.store.track(&uri).is_some_and(|r| r.bpm.is_none());
            if !still_missing {
                continue;
            }
            match self.tempo.fetch_tempo(&uri) {
                Some(bpm) => {
                    // Automatic enrichment: not an undoable user action
                    let applied = self.store.apply(Operation::SetBpm {
                        uri: uri.clone(),
                        bpm: Some(bpm),
                    });
                    if applied.changed {
                        debug!("Tempo for {}: {}", uri, bpm);
                        self.mark_dirty();
                    }
                }
                None => debug!("No tempo available for {}", uri),
            }
        }
    }

    fn run_playlist_adds(&mut self, uris: Vec<String>) {
        let Some(sync) = &self.playlist_sync else {
            return;
        };
        for uri in uris {
            if self.store.track(&uri).is_none() {
                continue;
            }
            match sync.add_to_playlist(&self.options.tagged_playlist_name, &uri) {
                Ok(playlist) => {
                    info!("Added {} to {}", uri, playlist.name);
                    if let Some(cache) = self.playlist_cache.as_mut() {
                        cache.note_added(&uri, &playlist);
                    }
                }
                Err(e) => warn!("Failed to add {} to {}: {}", uri, self.options.tagged_playlist_name, e),
            }
        }
    }
}
