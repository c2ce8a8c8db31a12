use std::collections::VecDeque;

use tracing::debug;

use super::Command;

/// Default number of commands retained for undo.
pub const DEFAULT_HISTORY_LIMIT: usize = 128;

/// Linear undo/redo history.
///
/// Entries before the cursor are applied; entries at or after it are
/// available to redo. Pushing while redo entries exist discards them.
/// Once the log holds `capacity` entries, the oldest is evicted on push.
#[derive(Debug, Clone)]
pub struct CommandLog {
    entries: VecDeque<Command>,
    cursor: usize,
    capacity: usize,
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl CommandLog {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_LIMIT)),
            cursor: 0,
            capacity,
        }
    }

    pub fn push(&mut self, command: Command) {
        let discarded = self.entries.len() - self.cursor;
        if discarded > 0 {
            debug!("Discarding {} redo entries", discarded);
            self.entries.truncate(self.cursor);
        }

        self.entries.push_back(command);
        self.cursor = self.entries.len();

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.cursor -= 1;
        }
    }

    /// Retreat the cursor and hand back the command to apply in reverse.
    pub fn undo(&mut self) -> Option<Command> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).cloned()
    }

    /// Hand back the command to re-apply forward and advance the cursor.
    pub fn redo(&mut self) -> Option<Command> {
        if !self.can_redo() {
            return None;
        }
        let command = self.entries.get(self.cursor).cloned();
        self.cursor += 1;
        command
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn peek_undo(&self) -> Option<&Command> {
        self.cursor.checked_sub(1).and_then(|idx| self.entries.get(idx))
    }

    pub fn peek_redo(&self) -> Option<&Command> {
        self.entries.get(self.cursor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    /// All retained commands, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault_tree::Position;

    fn move_cmd(id: &str, to: f64) -> Command {
        Command::MoveNode {
            subject_id: id.to_string(),
            before: Position::new(0.0, 0.0),
            after: Position::new(to, to),
        }
    }

    #[test]
    fn test_pushes_without_undo() {
        let mut log = CommandLog::new(16);
        for i in 0..5 {
            log.push(move_cmd("n1", i as f64));
        }
        assert!(log.can_undo());
        assert!(!log.can_redo());
        assert_eq!(log.cursor(), 5);
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn test_undo_then_redo_returns_same_command() {
        let mut log = CommandLog::new(16);
        log.push(move_cmd("n1", 1.0));
        log.push(move_cmd("n1", 2.0));

        let undone = log.undo().unwrap();
        assert_eq!(undone, move_cmd("n1", 2.0));
        assert_eq!(log.cursor(), 1);
        assert!(log.can_redo());

        let redone = log.redo().unwrap();
        assert_eq!(redone, undone);
        assert_eq!(log.cursor(), 2);
        assert!(!log.can_redo());
    }

    #[test]
    fn test_push_after_undo_discards_redo_branch() {
        let mut log = CommandLog::new(16);
        log.push(move_cmd("a", 1.0));
        log.push(move_cmd("b", 2.0));
        log.push(move_cmd("c", 3.0));
        log.undo();
        log.undo();
        assert!(log.can_redo());

        log.push(move_cmd("d", 4.0));
        assert!(!log.can_redo());
        assert_eq!(log.len(), 2);
        assert_eq!(log.redo(), None);
        assert_eq!(log.peek_undo(), Some(&move_cmd("d", 4.0)));
    }

    #[test]
    fn test_empty_log_is_a_no_op() {
        let mut log = CommandLog::new(16);
        assert_eq!(log.undo(), None);
        assert_eq!(log.cursor(), 0);
        assert_eq!(log.redo(), None);
        assert_eq!(log.cursor(), 0);

        log.push(move_cmd("n1", 1.0));
        assert_eq!(log.redo(), None);
        assert_eq!(log.cursor(), 1);
    }

    #[test]
    fn test_consecutive_moves_stay_distinct() {
        let mut log = CommandLog::new(16);
        log.push(move_cmd("n1", 1.0));
        log.push(move_cmd("n1", 2.0));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = CommandLog::new(3);
        for i in 0..5 {
            log.push(move_cmd("n1", i as f64));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.cursor(), 3);

        let oldest: Vec<_> = log.iter().cloned().collect();
        assert_eq!(oldest[0], move_cmd("n1", 2.0));

        assert!(log.undo().is_some());
        assert!(log.undo().is_some());
        assert!(log.undo().is_some());
        assert!(!log.can_undo());
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut log = CommandLog::new(0);
        assert_eq!(log.capacity(), 1);
        log.push(move_cmd("n1", 1.0));
        log.push(move_cmd("n1", 2.0));
        assert_eq!(log.len(), 1);
        assert_eq!(log.peek_undo(), Some(&move_cmd("n1", 2.0)));
    }
}
