use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tagify_lib::db::{Database, MemoryStorage, Storage};
use tagify_lib::deferred::ManualClock;
use tagify_lib::models::{AnnotationDocument, TrackTagRef};
use tagify_lib::playlists::{LocalPlaylists, TempoSource};
use tagify_lib::session::{LoadOutcome, SessionOptions, TagSession};
use tagify_lib::store::Operation;

const KEY: &str = "tagify:tagData";
const PLAYLISTS_KEY: &str = "tagify:tagData:playlists";

struct TempoTable(HashMap<String, f64>);

impl TempoSource for TempoTable {
    fn fetch_tempo(&self, uri: &str) -> Option<f64> {
        self.0.get(uri).copied()
    }
}

fn deep() -> TrackTagRef {
    TrackTagRef::new("genre", "house", "deep")
}

fn toggle(uri: &str, tag: TrackTagRef) -> Operation {
    Operation::ToggleTrackTag {
        uri: uri.to_string(),
        tag,
    }
}

fn stored(storage: &dyn Storage) -> AnnotationDocument {
    let json = storage.get(KEY).unwrap().expect("document stored");
    serde_json::from_str(&json).unwrap()
}

fn memory_session(storage: &Arc<MemoryStorage>, clock: &ManualClock) -> TagSession {
    TagSession::load(
        Box::new(storage.clone()),
        Box::new(clock.clone()),
        SessionOptions::default(),
    )
    .with_playlist_sync(Box::new(LocalPlaylists::new(storage.clone(), PLAYLISTS_KEY)))
}

#[test]
fn annotations_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tagify.db");
    let clock = ManualClock::new();

    {
        let db = Arc::new(Database::new(&path).unwrap());
        let mut session = TagSession::load(
            Box::new(db.clone()),
            Box::new(clock.clone()),
            SessionOptions::default(),
        );
        assert_eq!(session.load_outcome(), LoadOutcome::Seeded);
        session.apply(toggle("spotify:track:abc", deep()));
        session.apply(Operation::SetRating {
            uri: "spotify:track:abc".into(),
            rating: 4,
        });
        clock.advance(Duration::from_millis(1000));
        session.tick();
        assert!(!session.is_save_pending());
    }

    let db = Database::new(&path).unwrap();
    let session = TagSession::load(Box::new(db), Box::new(clock), SessionOptions::default());
    assert_eq!(session.load_outcome(), LoadOutcome::Loaded);
    let record = session.store().track("spotify:track:abc").unwrap();
    assert_eq!(record.rating, 4);
    assert_eq!(record.tags, vec![deep()]);
    assert_eq!(session.store().categories().len(), 4);
}

#[test]
fn quick_untag_never_reaches_the_playlist() {
    let storage = Arc::new(MemoryStorage::new());
    let clock = ManualClock::new();
    let mut session = memory_session(&storage, &clock);
    let playlists = LocalPlaylists::new(storage.clone(), PLAYLISTS_KEY);

    session.apply(toggle("t:1", deep()));
    clock.advance(Duration::from_millis(1500));
    session.apply(toggle("t:1", deep()));
    assert!(!session.is_playlist_add_pending("t:1"));

    clock.advance(Duration::from_millis(1000));
    session.tick();
    assert!(playlists.find_by_name("Tagged Tracks").unwrap().is_none());
    assert!(stored(storage.as_ref()).tracks.is_empty());
}

#[test]
fn newly_tagged_track_is_synced_once() {
    let storage = Arc::new(MemoryStorage::new());
    let clock = ManualClock::new();
    let mut session = memory_session(&storage, &clock);
    let playlists = LocalPlaylists::new(storage.clone(), PLAYLISTS_KEY);

    session.apply(Operation::SetEnergy {
        uri: "t:1".into(),
        energy: 7,
    });
    session.apply(toggle("t:1", deep()));
    clock.advance(Duration::from_millis(2000));
    session.tick();

    let tagged = playlists.find_by_name("Tagged Tracks").unwrap().unwrap();
    assert_eq!(tagged.tracks, vec!["t:1".to_string()]);

    // Still present: further edits do not schedule another add
    session.apply(Operation::SetRating {
        uri: "t:1".into(),
        rating: 2,
    });
    assert!(!session.is_playlist_add_pending("t:1"));
}

#[test]
fn tempo_lookup_feeds_the_export_comment() {
    let storage = Arc::new(MemoryStorage::new());
    let clock = ManualClock::new();
    let tempos = TempoTable(HashMap::from([("spotify:track:abc".to_string(), 126.0)]));
    let mut session = memory_session(&storage, &clock).with_tempo_source(Box::new(tempos));

    session.apply(Operation::SetEnergy {
        uri: "spotify:track:abc".into(),
        energy: 8,
    });
    session.apply(toggle("spotify:track:abc", deep()));
    session.tick();

    let export = session.export_data();
    assert_eq!(export.version, "1.0");
    let track = &export.tracks["abc"];
    assert_eq!(track.bpm, Some(126.0));
    assert_eq!(track.rekordbox_comment, "BPM 126 - Energy 8 - Deep");
    assert_eq!(track.tags[0].name, "Deep");

    // Enrichment is not an undo step of its own
    assert_eq!(session.undo().as_deref(), Some("Undo Toggle tag"));
    let record = session.store().track("spotify:track:abc").unwrap();
    assert!(record.tags.is_empty());
    assert_eq!(record.energy, 8);
}

#[test]
fn removing_a_tag_cleans_tracks_and_undo_restores_them() {
    let storage = Arc::new(MemoryStorage::new());
    let clock = ManualClock::new();
    let mut session = memory_session(&storage, &clock);

    session.apply(toggle("t:1", deep()));
    session.apply(toggle("t:2", deep()));
    session.apply(Operation::SetRating {
        uri: "t:2".into(),
        rating: 3,
    });
    assert!(session.finish());

    session.apply(Operation::RemoveTag { tag: deep() });
    assert!(session.store().track("t:1").is_none());
    assert!(session.store().track("t:2").unwrap().tags.is_empty());
    assert!(session.finish());
    let doc = stored(storage.as_ref());
    assert!(!doc.tracks.contains_key("t:1"));

    assert_eq!(session.undo().as_deref(), Some("Undo Remove tag"));
    assert!(session.store().track_has_tag("t:1", &deep()));
    assert!(session.store().track_has_tag("t:2", &deep()));
}

#[test]
fn unreadable_stored_data_is_left_until_next_edit() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(KEY, "{ not json").unwrap();
    let clock = ManualClock::new();

    let mut session = memory_session(&storage, &clock);
    assert_eq!(session.load_outcome(), LoadOutcome::Recovered);
    assert_eq!(storage.get(KEY).unwrap().as_deref(), Some("{ not json"));
    assert!(!session.store().categories().is_empty());

    // A read-only run ends without touching the stored value
    assert!(session.finish());
    assert_eq!(storage.get(KEY).unwrap().as_deref(), Some("{ not json"));

    session.apply(Operation::SetRating {
        uri: "t:1".into(),
        rating: 5,
    });
    assert!(session.finish());
    assert_eq!(stored(storage.as_ref()).tracks["t:1"].rating, 5);
}

#[test]
fn backup_moves_annotations_between_stores() {
    let clock = ManualClock::new();
    let source = Arc::new(MemoryStorage::new());
    let mut from = memory_session(&source, &clock);
    from.apply(Operation::AddCategory { name: "Label".into() });
    from.apply(Operation::SetRating {
        uri: "t:1".into(),
        rating: 4,
    });
    from.apply(Operation::SetBpm {
        uri: "t:1".into(),
        bpm: Some(122.5),
    });
    let backup = from.export_backup().unwrap();

    let target = Arc::new(MemoryStorage::new());
    let mut to = memory_session(&target, &clock);
    assert!(to.import_backup("{\"categories\": []}").is_err());
    to.import_backup(&backup).unwrap();
    assert_eq!(to.store().document(), from.store().document());
    assert!(!to.is_playlist_add_pending("t:1"));
    assert!(to.pending_tempo_lookups().is_empty());
    assert!(to.finish());
    assert_eq!(&stored(target.as_ref()), from.store().document());
}
