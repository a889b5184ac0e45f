use crate::models::{AnnotationDocument, Category, TrackRecord, TrackTagRef, MAX_ENERGY, MAX_RATING};
use crate::taxonomy;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AddCategory { name: String },
    RemoveCategory { category_id: String },
    RenameCategory { category_id: String, name: String },
    AddSubcategory { category_id: String, name: String },
    RemoveSubcategory { category_id: String, subcategory_id: String },
    RenameSubcategory { category_id: String, subcategory_id: String, name: String },
    AddTag { category_id: String, subcategory_id: String, name: String },
    RemoveTag { tag: TrackTagRef },
    RenameTag { tag: TrackTagRef, name: String },
    ToggleTrackTag { uri: String, tag: TrackTagRef },
    ToggleTagForTracks { uris: Vec<String>, tag: TrackTagRef },
    SetRating { uri: String, rating: u8 },
    SetEnergy { uri: String, energy: u8 },
    SetBpm { uri: String, bpm: Option<f64> },
    /// Wholesale replacement, used by backup import.
    Replace(AnnotationDocument),
}

impl Operation {
    /// Short human-readable label (undo history, logs).
    pub fn label(&self) -> &'static str {
        match self {
            Operation::AddCategory { .. } => "Add category",
            Operation::RemoveCategory { .. } => "Remove category",
            Operation::RenameCategory { .. } => "Rename category",
            Operation::AddSubcategory { .. } => "Add subcategory",
            Operation::RemoveSubcategory { .. } => "Remove subcategory",
            Operation::RenameSubcategory { .. } => "Rename subcategory",
            Operation::AddTag { .. } => "Add tag",
            Operation::RemoveTag { .. } => "Remove tag",
            Operation::RenameTag { .. } => "Rename tag",
            Operation::ToggleTrackTag { .. } => "Toggle tag",
            Operation::ToggleTagForTracks { .. } => "Toggle tag on tracks",
            Operation::SetRating { .. } => "Set rating",
            Operation::SetEnergy { .. } => "Set energy",
            Operation::SetBpm { .. } => "Set BPM",
            Operation::Replace(_) => "Import backup",
        }
    }
}

/// Presence edge of a single track record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackTransition {
    /// Absent → Present: the track got its first rating, energy or tag.
    Created(String),
    /// Present → Absent: the last of those was cleared.
    Removed(String),
}

impl TrackTransition {
    pub fn uri(&self) -> &str {
        match self {
            TrackTransition::Created(uri) | TrackTransition::Removed(uri) => uri,
        }
    }
}

/// Result of applying an [`Operation`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    pub transitions: Vec<TrackTransition>,
    /// Id minted by an `Add*` operation.
    pub created_id: Option<String>,
    /// `false` when the operation was a no-op.
    pub changed: bool,
}

/// A track is either absent from the map or present with a non-empty record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationStore {
    doc: AnnotationDocument,
}

impl AnnotationStore {
    /// Fresh store with the default taxonomy and no tracks.
    pub fn seeded() -> Self {
        Self {
            doc: AnnotationDocument {
                categories: taxonomy::default_taxonomy(),
                tracks: BTreeMap::new(),
            },
        }
    }

    /// Builds a store from a decoded document, dropping dangling tag
    /// references, duplicate triples and records left empty by that.
    pub fn from_document(doc: AnnotationDocument) -> Self {
        let mut store = Self { doc };
        store.normalize();
        store
    }

    pub fn categories(&self) -> &[Category] {
        &self.doc.categories
    }

    pub fn tracks(&self) -> &BTreeMap<String, TrackRecord> {
        &self.doc.tracks
    }

    pub fn track(&self, uri: &str) -> Option<&TrackRecord> {
        self.doc.tracks.get(uri)
    }

    pub fn document(&self) -> &AnnotationDocument {
        &self.doc
    }

    pub fn into_document(self) -> AnnotationDocument {
        self.doc
    }

    /// Pure form of [`apply`](Self::apply): returns the next snapshot.
    pub fn applied(&self, op: Operation) -> (AnnotationStore, Applied) {
        let mut next = self.clone();
        let outcome = next.apply(op);
        (next, outcome)
    }

    pub fn apply(&mut self, op: Operation) -> Applied {
        debug!("store: {}", op.label());
        match op {
            Operation::AddCategory { name } => {
                let id = taxonomy::add_category(&mut self.doc.categories, &name);
                Applied {
                    created_id: Some(id),
                    changed: true,
                    ..Default::default()
                }
            }
            Operation::RemoveCategory { category_id } => {
                if !taxonomy::remove_category(&mut self.doc.categories, &category_id) {
                    return Applied::default();
                }
                self.purge(|t| t.category_id == category_id)
            }
            Operation::RenameCategory { category_id, name } => {
                changed(taxonomy::rename_category(&mut self.doc.categories, &category_id, &name))
            }
            Operation::AddSubcategory { category_id, name } => {
                let id = taxonomy::add_subcategory(&mut self.doc.categories, &category_id, &name);
                Applied {
                    changed: id.is_some(),
                    created_id: id,
                    ..Default::default()
                }
            }
            Operation::RemoveSubcategory {
                category_id,
                subcategory_id,
            } => {
                if !taxonomy::remove_subcategory(&mut self.doc.categories, &category_id, &subcategory_id) {
                    return Applied::default();
                }
                self.purge(|t| t.category_id == category_id && t.subcategory_id == subcategory_id)
            }
            Operation::RenameSubcategory {
                category_id,
                subcategory_id,
                name,
            } => changed(taxonomy::rename_subcategory(
                &mut self.doc.categories,
                &category_id,
                &subcategory_id,
                &name,
            )),
            Operation::AddTag {
                category_id,
                subcategory_id,
                name,
            } => {
                let id = taxonomy::add_tag(&mut self.doc.categories, &category_id, &subcategory_id, &name);
                Applied {
                    changed: id.is_some(),
                    created_id: id,
                    ..Default::default()
                }
            }
            Operation::RemoveTag { tag } => {
                if !taxonomy::remove_tag(&mut self.doc.categories, &tag) {
                    return Applied::default();
                }
                self.purge(|t| *t == tag)
            }
            Operation::RenameTag { tag, name } => {
                changed(taxonomy::rename_tag(&mut self.doc.categories, &tag, &name))
            }
            Operation::ToggleTrackTag { uri, tag } => self.toggle_one(&uri, &tag),
            Operation::ToggleTagForTracks { uris, tag } => self.toggle_many(&uris, &tag),
            Operation::SetRating { uri, rating } => {
                let rating = rating.min(MAX_RATING);
                self.edit_track(&uri, |r| r.rating = rating)
            }
            Operation::SetEnergy { uri, energy } => {
                let energy = energy.min(MAX_ENERGY);
                self.edit_track(&uri, |r| r.energy = energy)
            }
            Operation::SetBpm { uri, bpm } => {
                let bpm = bpm.filter(|b| b.is_finite() && *b > 0.0);
                self.edit_track(&uri, |r| r.bpm = bpm)
            }
            Operation::Replace(doc) => {
                let before = std::mem::replace(self, Self::from_document(doc));
                Applied {
                    transitions: presence_changes(&before, self),
                    created_id: None,
                    changed: true,
                }
            }
        }
    }

    // ─── Convenience wrappers ────────────────────────────────────

    pub fn add_category(&mut self, name: &str) -> Applied {
        self.apply(Operation::AddCategory { name: name.into() })
    }

    pub fn remove_category(&mut self, category_id: &str) -> Applied {
        self.apply(Operation::RemoveCategory {
            category_id: category_id.into(),
        })
    }

    pub fn rename_category(&mut self, category_id: &str, name: &str) -> Applied {
        self.apply(Operation::RenameCategory {
            category_id: category_id.into(),
            name: name.into(),
        })
    }

    pub fn add_subcategory(&mut self, category_id: &str, name: &str) -> Applied {
        self.apply(Operation::AddSubcategory {
            category_id: category_id.into(),
            name: name.into(),
        })
    }

    pub fn remove_subcategory(&mut self, category_id: &str, subcategory_id: &str) -> Applied {
        self.apply(Operation::RemoveSubcategory {
            category_id: category_id.into(),
            subcategory_id: subcategory_id.into(),
        })
    }

    pub fn rename_subcategory(&mut self, category_id: &str, subcategory_id: &str, name: &str) -> Applied {
        self.apply(Operation::RenameSubcategory {
            category_id: category_id.into(),
            subcategory_id: subcategory_id.into(),
            name: name.into(),
        })
    }

    pub fn add_tag(&mut self, category_id: &str, subcategory_id: &str, name: &str) -> Applied {
        self.apply(Operation::AddTag {
            category_id: category_id.into(),
            subcategory_id: subcategory_id.into(),
            name: name.into(),
        })
    }

    pub fn remove_tag(&mut self, tag: &TrackTagRef) -> Applied {
        self.apply(Operation::RemoveTag { tag: tag.clone() })
    }

    pub fn rename_tag(&mut self, tag: &TrackTagRef, name: &str) -> Applied {
        self.apply(Operation::RenameTag {
            tag: tag.clone(),
            name: name.into(),
        })
    }

    pub fn toggle_track_tag(&mut self, uri: &str, tag: &TrackTagRef) -> Applied {
        self.apply(Operation::ToggleTrackTag {
            uri: uri.into(),
            tag: tag.clone(),
        })
    }

    pub fn toggle_tag_for_tracks(&mut self, uris: &[String], tag: &TrackTagRef) -> Applied {
        self.apply(Operation::ToggleTagForTracks {
            uris: uris.to_vec(),
            tag: tag.clone(),
        })
    }

    pub fn set_rating(&mut self, uri: &str, rating: u8) -> Applied {
        self.apply(Operation::SetRating { uri: uri.into(), rating })
    }

    pub fn set_energy(&mut self, uri: &str, energy: u8) -> Applied {
        self.apply(Operation::SetEnergy { uri: uri.into(), energy })
    }

    pub fn set_bpm(&mut self, uri: &str, bpm: Option<f64>) -> Applied {
        self.apply(Operation::SetBpm { uri: uri.into(), bpm })
    }

    // ─── Queries ─────────────────────────────────────────────────

    /// Tags shared by every listed track, in the first track's order.
    pub fn find_common_tags(&self, uris: &[String]) -> Vec<TrackTagRef> {
        let Some((first, rest)) = uris.split_first() else {
            return Vec::new();
        };
        let Some(first) = self.track(first) else {
            return Vec::new();
        };
        first
            .tags
            .iter()
            .filter(|tag| {
                rest.iter()
                    .all(|uri| self.track(uri).is_some_and(|r| r.has_tag(tag)))
            })
            .cloned()
            .collect()
    }

    pub fn track_has_tag(&self, uri: &str, tag: &TrackTagRef) -> bool {
        self.track(uri).is_some_and(|r| r.has_tag(tag))
    }

    // ─── Internals ───────────────────────────────────────────────

    /// Runs `edit` against the record for `uri` (a blank one if absent), then
    /// stores it back unless it ended up empty.
    fn edit_track<F>(&mut self, uri: &str, edit: F) -> Applied
    where
        F: FnOnce(&mut TrackRecord),
    {
        let existing = self.doc.tracks.remove(uri);
        let existed = existing.is_some();
        let mut record = existing.unwrap_or_default();
        let original = record.clone();
        edit(&mut record);

        let is_changed = (existed || !record.is_empty()) && record != original;
        let transition = if record.is_empty() {
            existed.then(|| TrackTransition::Removed(uri.to_string()))
        } else {
            self.doc.tracks.insert(uri.to_string(), record);
            (!existed).then(|| TrackTransition::Created(uri.to_string()))
        };

        Applied {
            changed: is_changed || transition.is_some(),
            transitions: transition.into_iter().collect(),
            created_id: None,
        }
    }

    fn toggle_one(&mut self, uri: &str, tag: &TrackTagRef) -> Applied {
        if self.track_has_tag(uri, tag) {
            self.edit_track(uri, |r| r.tags.retain(|t| t != tag))
        } else if taxonomy::find_tag(&self.doc.categories, tag).is_some() {
            self.edit_track(uri, |r| r.tags.push(tag.clone()))
        } else {
            Applied::default()
        }
    }

    /// Fill to all when any track lacks the tag, otherwise clear from all.
    fn toggle_many(&mut self, uris: &[String], tag: &TrackTagRef) -> Applied {
        let mut unique: Vec<&String> = Vec::with_capacity(uris.len());
        for uri in uris {
            if !unique.contains(&uri) {
                unique.push(uri);
            }
        }
        if unique.is_empty() {
            return Applied::default();
        }

        let all_have = unique.iter().all(|uri| self.track_has_tag(uri, tag));
        if !all_have && taxonomy::find_tag(&self.doc.categories, tag).is_none() {
            return Applied::default();
        }

        let mut outcome = Applied::default();
        for uri in unique {
            let step = if all_have {
                self.edit_track(uri, |r| r.tags.retain(|t| t != tag))
            } else if !self.track_has_tag(uri, tag) {
                self.edit_track(uri, |r| r.tags.push(tag.clone()))
            } else {
                continue;
            };
            outcome.changed |= step.changed;
            outcome.transitions.extend(step.transitions);
        }
        outcome
    }

    /// Strips matching references from every track, deleting records left empty.
    fn purge<P>(&mut self, matches: P) -> Applied
    where
        P: Fn(&TrackTagRef) -> bool,
    {
        let mut transitions = Vec::new();
        self.doc.tracks.retain(|uri, record| {
            record.tags.retain(|t| !matches(t));
            if record.is_empty() {
                transitions.push(TrackTransition::Removed(uri.clone()));
                false
            } else {
                true
            }
        });
        Applied {
            transitions,
            created_id: None,
            changed: true,
        }
    }

    fn normalize(&mut self) {
        let categories = &self.doc.categories;
        self.doc.tracks.retain(|_, record| {
            record.dedup_tags();
            record
                .tags
                .retain(|t| taxonomy::find_tag(categories, t).is_some());
            record.rating = record.rating.min(MAX_RATING);
            record.energy = record.energy.min(MAX_ENERGY);
            !record.is_empty()
        });
    }
}

/// Presence edges between two snapshots: removals first, then creations,
/// each in uri order.
pub fn presence_changes(before: &AnnotationStore, after: &AnnotationStore) -> Vec<TrackTransition> {
    let removed = before
        .tracks()
        .keys()
        .filter(|uri| !after.tracks().contains_key(*uri))
        .map(|uri| TrackTransition::Removed(uri.clone()));
    let created = after
        .tracks()
        .keys()
        .filter(|uri| !before.tracks().contains_key(*uri))
        .map(|uri| TrackTransition::Created(uri.clone()));
    removed.chain(created).collect()
}

fn changed(flag: bool) -> Applied {
    Applied {
        changed: flag,
        ..Default::default()
    }
}
