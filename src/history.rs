use crate::filter_chain::NONE_DESCRIPTOR;

/// Linear undo/redo log of filter-descriptor snapshots.
///
/// The cursor always points at the snapshot currently rendered; recording a
/// fresh edit after an undo discards the redo-able tail.
#[derive(Debug, Clone)]
pub struct EditHistory {
    snapshots: Vec<String>,
    position: usize,
}

impl EditHistory {
    /// Fresh history for a newly opened image: one `none` snapshot.
    pub fn new() -> Self {
        Self::open(NONE_DESCRIPTOR)
    }

    /// Resets the history to a single initial snapshot, cursor at 0.
    pub fn open(initial: &str) -> Self {
        Self {
            snapshots: vec![initial.to_string()],
            position: 0,
        }
    }

    /// Truncates any redo-able future, appends the snapshot, and moves the
    /// cursor to it.
    pub fn record(&mut self, descriptor: String) {
        self.snapshots.truncate(self.position + 1);
        self.snapshots.push(descriptor);
        self.position = self.snapshots.len() - 1;
    }

    pub fn can_undo(&self) -> bool {
        self.position > 0
    }

    pub fn can_redo(&self) -> bool {
        self.position + 1 < self.snapshots.len()
    }

    /// Steps the cursor back one snapshot; `None` when already at the start.
    pub fn undo(&mut self) -> Option<&str> {
        if !self.can_undo() {
            return None;
        }
        self.position -= 1;
        Some(&self.snapshots[self.position])
    }

    /// Steps the cursor forward one snapshot; `None` when already at the end.
    pub fn redo(&mut self) -> Option<&str> {
        if !self.can_redo() {
            return None;
        }
        self.position += 1;
        Some(&self.snapshots[self.position])
    }

    /// Descriptor at the cursor.
    pub fn current(&self) -> &str {
        &self.snapshots[self.position]
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_a_single_none_snapshot() {
        let history = EditHistory::new();
        assert_eq!(history.current(), "none");
        assert_eq!(history.len(), 1);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_and_redo_walk_the_cursor() {
        let mut history = EditHistory::new();
        history.record("brightness(1.20)".to_string());
        history.record("brightness(1.20) contrast(0.90)".to_string());

        assert_eq!(history.undo(), Some("brightness(1.20)"));
        assert_eq!(history.current(), "brightness(1.20)");
        assert_eq!(history.redo(), Some("brightness(1.20) contrast(0.90)"));
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_is_a_no_op_at_the_start() {
        let mut history = EditHistory::new();
        assert_eq!(history.undo(), None);
        assert_eq!(history.current(), "none");
        assert_eq!(history.position(), 0);
    }

    #[test]
    fn record_after_undo_discards_the_redo_tail() {
        let mut history = EditHistory::new();
        history.record("A".to_string());
        history.record("B".to_string());
        history.undo();
        history.record("C".to_string());

        assert_eq!(history.len(), 3);
        assert_eq!(history.position(), 2);
        assert_eq!(history.current(), "C");
        assert_eq!(history.redo(), None);

        // The live sequence is exactly [none, A, C].
        assert_eq!(history.undo(), Some("A"));
        assert_eq!(history.undo(), Some("none"));
        assert_eq!(history.undo(), None);
    }

    #[test]
    fn cursor_never_leaves_bounds_under_mixed_sequences() {
        let mut history = EditHistory::new();
        for i in 0..5 {
            history.record(format!("step-{i}"));
        }
        for _ in 0..20 {
            history.undo();
        }
        assert_eq!(history.position(), 0);
        for _ in 0..20 {
            history.redo();
        }
        assert_eq!(history.position(), history.len() - 1);
        assert_eq!(history.current(), "step-4");
    }
}
