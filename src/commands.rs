use crate::config::Config;
use crate::db::Storage;
use crate::filter::{filter_tracks, tag_usage_counts, MatchMode, TrackFilter};
use crate::logging::LogState;
use crate::models::TrackTagRef;
use crate::playlist_cache::PlaylistCache;
use crate::playlists::PlaylistSource;
use crate::session::TagSession;
use crate::store::{Applied, Operation};
use crate::taxonomy;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Page size used when walking playlists for the membership cache.
const PLAYLIST_PAGE_SIZE: usize = 50;

#[derive(Debug, Parser)]
#[command(name = "tagify", version, about = "Rate, tag and export your tracks")]
pub struct Cli {
    /// Path to config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding tagify.db
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the category tree with ids
    Categories,
    AddCategory { name: String },
    RenameCategory { id: String, name: String },
    RemoveCategory { id: String },
    AddSubcategory { category: String, name: String },
    RenameSubcategory { category: String, id: String, name: String },
    RemoveSubcategory { category: String, id: String },
    AddTag { category: String, subcategory: String, name: String },
    /// TAG is `category/subcategory/tag`
    RenameTag { tag: String, name: String },
    RemoveTag { tag: String },
    /// Toggle TAG on one track, or fill/clear it across several
    Toggle {
        tag: String,
        #[arg(required = true, num_args = 1..)]
        uris: Vec<String>,
    },
    Rate {
        uri: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=5))]
        rating: u8,
    },
    Energy {
        uri: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=10))]
        energy: u8,
    },
    /// Set or clear (no value) the tempo
    Bpm { uri: String, bpm: Option<f64> },
    Show { uri: String },
    /// Tags shared by every listed track
    Common {
        #[arg(required = true, num_args = 1..)]
        uris: Vec<String>,
    },
    Filter {
        #[arg(long = "tag")]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        /// Match any included tag instead of all
        #[arg(long)]
        any: bool,
        #[arg(long)]
        min_rating: Option<u8>,
        #[arg(long)]
        min_energy: Option<u8>,
        #[arg(long)]
        max_energy: Option<u8>,
        #[arg(long)]
        min_bpm: Option<f64>,
        #[arg(long)]
        max_bpm: Option<f64>,
    },
    /// Tracks per tag
    Usage,
    ExportBackup { file: Option<PathBuf> },
    ImportBackup { file: PathBuf },
    /// Export for DJ software
    Export { file: Option<PathBuf> },
    /// Playlists containing a track
    Playlists {
        uri: String,
        #[arg(long)]
        refresh: bool,
    },
    /// Recent log entries
    Logs,
}

/// Everything a command may need besides the session.
pub struct CommandContext<'a> {
    pub config: &'a Config,
    pub storage: &'a dyn Storage,
    pub playlists: &'a dyn PlaylistSource,
    pub logs: Option<&'a LogState>,
}

fn parse_tag(path: &str) -> Result<TrackTagRef> {
    TrackTagRef::parse_path(path)
        .ok_or_else(|| anyhow!("Invalid tag '{}', expected category/subcategory/tag", path))
}

fn describe(applied: &Applied, what: &str) -> String {
    match (&applied.created_id, applied.changed) {
        (Some(id), _) => format!("{} created: {}", what, id),
        (None, true) => format!("{} updated", what),
        (None, false) => format!("{}: nothing to change", what),
    }
}

pub fn execute(session: &mut TagSession, ctx: &CommandContext<'_>, command: Command) -> Result<String> {
    let output = match command {
        Command::Categories => render_tree(session),
        Command::AddCategory { name } => {
            let applied = session.apply(Operation::AddCategory { name });
            describe(&applied, "Category")
        }
        Command::RenameCategory { id, name } => {
            let applied = session.apply(Operation::RenameCategory { category_id: id, name });
            describe(&applied, "Category")
        }
        Command::RemoveCategory { id } => {
            let applied = session.apply(Operation::RemoveCategory { category_id: id });
            describe(&applied, "Category")
        }
        Command::AddSubcategory { category, name } => {
            let applied = session.apply(Operation::AddSubcategory {
                category_id: category,
                name,
            });
            describe(&applied, "Subcategory")
        }
        Command::RenameSubcategory { category, id, name } => {
            let applied = session.apply(Operation::RenameSubcategory {
                category_id: category,
                subcategory_id: id,
                name,
            });
            describe(&applied, "Subcategory")
        }
        Command::RemoveSubcategory { category, id } => {
            let applied = session.apply(Operation::RemoveSubcategory {
                category_id: category,
                subcategory_id: id,
            });
            describe(&applied, "Subcategory")
        }
        Command::AddTag {
            category,
            subcategory,
            name,
        } => {
            let applied = session.apply(Operation::AddTag {
                category_id: category,
                subcategory_id: subcategory,
                name,
            });
            describe(&applied, "Tag")
        }
        Command::RenameTag { tag, name } => {
            let applied = session.apply(Operation::RenameTag {
                tag: parse_tag(&tag)?,
                name,
            });
            describe(&applied, "Tag")
        }
        Command::RemoveTag { tag } => {
            let applied = session.apply(Operation::RemoveTag { tag: parse_tag(&tag)? });
            describe(&applied, "Tag")
        }
        Command::Toggle { tag, mut uris } => {
            let tag = parse_tag(&tag)?;
            let op = if uris.len() == 1 {
                Operation::ToggleTrackTag {
                    uri: uris.remove(0),
                    tag,
                }
            } else {
                Operation::ToggleTagForTracks { uris, tag }
            };
            let applied = session.apply(op);
            describe(&applied, "Tracks")
        }
        Command::Rate { uri, rating } => describe(&session.apply(Operation::SetRating { uri, rating }), "Rating"),
        Command::Energy { uri, energy } => describe(&session.apply(Operation::SetEnergy { uri, energy }), "Energy"),
        Command::Bpm { uri, bpm } => describe(&session.apply(Operation::SetBpm { uri, bpm }), "BPM"),
        Command::Show { uri } => render_track(session, &uri),
        Command::Common { uris } => {
            let store = session.store();
            store
                .find_common_tags(&uris)
                .iter()
                .map(|t| format!("{}  {}", t, taxonomy::tag_name(store.categories(), t).unwrap_or("?")))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::Filter {
            include,
            exclude,
            any,
            min_rating,
            min_energy,
            max_energy,
            min_bpm,
            max_bpm,
        } => {
            let filter = TrackFilter {
                include: include.iter().map(|t| parse_tag(t)).collect::<Result<_>>()?,
                exclude: exclude.iter().map(|t| parse_tag(t)).collect::<Result<_>>()?,
                mode: if any { MatchMode::Any } else { MatchMode::All },
                min_rating,
                energy: match (min_energy, max_energy) {
                    (None, None) => None,
                    (lo, hi) => Some((lo.unwrap_or(0), hi.unwrap_or(u8::MAX))),
                },
                bpm: match (min_bpm, max_bpm) {
                    (None, None) => None,
                    (lo, hi) => Some((lo.unwrap_or(0.0), hi.unwrap_or(f64::MAX))),
                },
            };
            filter_tracks(session.store(), &filter).join("\n")
        }
        Command::Usage => tag_usage_counts(session.store())
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(tag, count)| format!("{:>5}  {}", count, tag))
            .collect::<Vec<_>>()
            .join("\n"),
        Command::ExportBackup { file } => {
            let json = session.export_backup()?;
            write_or_return(file, json)?
        }
        Command::ImportBackup { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            session
                .import_backup(&json)
                .with_context(|| format!("Refusing to import {}", file.display()))?;
            format!(
                "Imported {} categories and {} tracks",
                session.store().categories().len(),
                session.store().tracks().len()
            )
        }
        Command::Export { file } => {
            let json = serde_json::to_string_pretty(&session.export_data())?;
            write_or_return(file, json)?
        }
        Command::Playlists { uri, refresh } => {
            let now = chrono::Utc::now();
            let fresh = session
                .playlist_cache()
                .filter(|c| !refresh && !c.is_stale(ctx.config.playlist_cache_ttl(), now))
                .cloned();
            let cache = match fresh {
                Some(cache) => cache,
                None => {
                    let cache = PlaylistCache::rebuild(ctx.playlists, PLAYLIST_PAGE_SIZE, now)?;
                    cache.save(ctx.storage, &ctx.config.playlist_cache_key())?;
                    session.set_playlist_cache(cache.clone());
                    cache
                }
            };
            cache
                .playlists_for_track(&uri)
                .iter()
                .map(|p| format!("{}  {}", p.id, p.name))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::Logs => match ctx.logs {
            Some(logs) => logs
                .entries()
                .iter()
                .map(|e| format!("[{}] [{}] {}", e.timestamp, e.level, e.message))
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        },
    };
    Ok(output)
}

fn write_or_return(file: Option<PathBuf>, json: String) -> Result<String> {
    match file {
        Some(path) => {
            std::fs::write(&path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(format!("Wrote {}", path.display()))
        }
        None => Ok(json),
    }
}

fn render_tree(session: &TagSession) -> String {
    let mut out = String::new();
    for category in session.store().categories() {
        let _ = writeln!(out, "{} [{}]", category.name, category.id);
        for sub in &category.subcategories {
            let _ = writeln!(out, "  {} [{}]", sub.name, sub.id);
            for tag in &sub.tags {
                let _ = writeln!(out, "    {} [{}]", tag.name, tag.id);
            }
        }
    }
    out.trim_end().to_string()
}

fn render_track(session: &TagSession, uri: &str) -> String {
    let store = session.store();
    let Some(record) = store.track(uri) else {
        return format!("{}: no annotations", uri);
    };
    let mut out = String::new();
    let _ = writeln!(out, "{}", uri);
    let _ = writeln!(out, "  rating: {}", record.rating);
    let _ = writeln!(out, "  energy: {}", record.energy);
    match record.bpm {
        Some(bpm) => {
            let _ = writeln!(out, "  bpm:    {}", bpm);
        }
        None => {
            let _ = writeln!(out, "  bpm:    -");
        }
    }
    for tag in &record.tags {
        let name = taxonomy::tag_name(store.categories(), tag).unwrap_or("?");
        let _ = writeln!(out, "  tag:    {} ({})", name, tag);
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;
    use crate::deferred::ManualClock;
    use crate::playlists::LocalPlaylists;
    use crate::session::SessionOptions;
    use std::sync::Arc;

    struct Harness {
        config: Config,
        storage: Arc<MemoryStorage>,
        playlists: LocalPlaylists<Arc<MemoryStorage>>,
        session: TagSession,
    }

    impl Harness {
        fn new() -> Self {
            let config = Config::default();
            let storage = Arc::new(MemoryStorage::new());
            let playlists = LocalPlaylists::new(storage.clone(), "tagify:tagData:playlists");
            let session = TagSession::load(
                Box::new(storage.clone()),
                Box::new(ManualClock::new()),
                SessionOptions::from(&config),
            )
            .with_playlist_sync(Box::new(LocalPlaylists::new(
                storage.clone(),
                "tagify:tagData:playlists",
            )));
            Self {
                config,
                storage,
                playlists,
                session,
            }
        }

        fn run(&mut self, args: &[&str]) -> Result<String> {
            let cli = Cli::try_parse_from(std::iter::once("tagify").chain(args.iter().copied()))?;
            let ctx = CommandContext {
                config: &self.config,
                storage: self.storage.as_ref(),
                playlists: &self.playlists,
                logs: None,
            };
            execute(&mut self.session, &ctx, cli.command)
        }
    }

    #[test]
    fn taxonomy_commands() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["add-category", "Label"]).unwrap(), "Category created: label");
        assert_eq!(
            h.run(&["add-subcategory", "label", "Imprint"]).unwrap(),
            "Subcategory created: imprint"
        );
        assert_eq!(
            h.run(&["add-tag", "label", "imprint", "Solid"]).unwrap(),
            "Tag created: solid"
        );
        assert_eq!(
            h.run(&["rename-tag", "label/imprint/solid", "Rock Solid"]).unwrap(),
            "Tag updated"
        );
        let tree = h.run(&["categories"]).unwrap();
        assert!(tree.contains("    Rock Solid [solid]"));
        assert_eq!(
            h.run(&["rename-category", "missing", "X"]).unwrap(),
            "Category: nothing to change"
        );
    }

    #[test]
    fn toggle_show_and_common() {
        let mut h = Harness::new();
        h.run(&["toggle", "genre/house/deep", "t:1", "t:2"]).unwrap();
        h.run(&["rate", "t:1", "4"]).unwrap();
        h.run(&["bpm", "t:1", "124"]).unwrap();

        let shown = h.run(&["show", "t:1"]).unwrap();
        assert!(shown.contains("rating: 4"));
        assert!(shown.contains("bpm:    124"));
        assert!(shown.contains("tag:    Deep (genre/house/deep)"));

        assert_eq!(h.run(&["common", "t:1", "t:2"]).unwrap(), "genre/house/deep  Deep");
        assert_eq!(h.run(&["filter", "--min-rating", "3"]).unwrap(), "t:1");
        assert_eq!(h.run(&["usage"]).unwrap(), "    2  genre/house/deep");
    }

    #[test]
    fn rejects_bad_input() {
        let mut h = Harness::new();
        assert!(h.run(&["rate", "t:1", "6"]).is_err());
        assert!(h.run(&["toggle", "genre/house", "t:1"]).is_err());
        assert!(h.run(&["show", "t:1"]).unwrap().ends_with("no annotations"));
    }

    #[test]
    fn backup_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        let path_str = path.to_str().unwrap();

        let mut h = Harness::new();
        h.run(&["rate", "t:1", "5"]).unwrap();
        h.run(&["export-backup", path_str]).unwrap();
        h.run(&["rate", "t:1", "0"]).unwrap();
        assert!(h.session.store().tracks().is_empty());

        let msg = h.run(&["import-backup", path_str]).unwrap();
        assert!(msg.ends_with("and 1 tracks"));
        assert_eq!(h.session.store().track("t:1").unwrap().rating, 5);

        std::fs::write(&path, "[]").unwrap();
        assert!(h.run(&["import-backup", path_str]).is_err());
        assert_eq!(h.session.store().track("t:1").unwrap().rating, 5);
    }

    #[test]
    fn playlists_come_from_cache() {
        let mut h = Harness::new();
        h.run(&["energy", "t:1", "6"]).unwrap();
        assert!(h.session.finish());

        let out = h.run(&["playlists", "t:1"]).unwrap();
        assert_eq!(out, "tagged-tracks  Tagged Tracks");
        assert!(h.storage.get("tagify:tagData:playlistCache").unwrap().is_some());
    }

    #[test]
    fn export_prints_comment() {
        let mut h = Harness::new();
        h.run(&["toggle", "genre/house/deep", "spotify:track:abc"]).unwrap();
        h.run(&["energy", "spotify:track:abc", "7"]).unwrap();
        let json = h.run(&["export"]).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(doc["tracks"]["abc"]["rekordbox_comment"], "Energy 7 - Deep");
    }
}
