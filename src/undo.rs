use crate::store::AnnotationStore;

/// Snapshots kept per direction before the oldest is dropped.
pub const MAX_UNDO_DEPTH: usize = 100;

#[derive(Debug, Clone)]
struct Entry {
    label: &'static str,
    snapshot: AnnotationStore,
}

/// Snapshot-based undo/redo. Each entry holds the store as it was on the
/// other side of the labelled operation.
#[derive(Debug, Default)]
pub struct UndoStack {
    undo_stack: Vec<Entry>,
    redo_stack: Vec<Entry>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the state before a mutation labelled `label`.
    pub fn push(&mut self, label: &'static str, before: AnnotationStore) {
        self.undo_stack.push(Entry {
            label,
            snapshot: before,
        });
        if self.undo_stack.len() > MAX_UNDO_DEPTH {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear(); // New action invalidates redo history
    }

    /// Swaps `current` for the previous snapshot. Returns a message and the
    /// snapshot to install, or `None` when there is nothing to undo.
    pub fn undo(&mut self, current: &AnnotationStore) -> Option<(String, AnnotationStore)> {
        let entry = self.undo_stack.pop()?;
        let message = format!("Undo {}", entry.label);
        self.redo_stack.push(Entry {
            label: entry.label,
            snapshot: current.clone(),
        });
        Some((message, entry.snapshot))
    }

    pub fn redo(&mut self, current: &AnnotationStore) -> Option<(String, AnnotationStore)> {
        let entry = self.redo_stack.pop()?;
        let message = format!("Redo {}", entry.label);
        self.undo_stack.push(Entry {
            label: entry.label,
            snapshot: current.clone(),
        });
        Some((message, entry.snapshot))
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
