use std::collections::VecDeque;

use thiserror::Error;

use crate::sequence_less_than;

/// Errors that can occur during SequenceList operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Attempted to insert a duplicate ID into the sequence list
    #[error("Duplicate sequence ID {id} not allowed in SequenceList")]
    DuplicateId { id: u16 },
}

/// Items kept sorted by wrapping sequence number.
///
/// Out-of-order arrivals are usually close to the newest entry, so inserts
/// scan from the back.
pub struct SequenceList<T> {
    list: VecDeque<(u16, T)>,
}

impl<T> SequenceList<T> {
    pub fn new() -> Self {
        Self {
            list: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn front_id(&self) -> Option<u16> {
        self.list.front().map(|(id, _)| *id)
    }

    pub fn pop_front(&mut self) -> Option<(u16, T)> {
        self.list.pop_front()
    }

    /// Removes the front item only if its ID is `id`
    pub fn pop_front_if(&mut self, id: u16) -> Option<T> {
        if self.front_id() == Some(id) {
            return self.list.pop_front().map(|(_, item)| item);
        }
        None
    }

    pub fn contains_scan_from_back(&self, id: &u16) -> bool {
        for (old_id, _) in self.list.iter().rev() {
            if old_id == id {
                return true;
            }
            if sequence_less_than(*old_id, *id) {
                return false;
            }
        }
        false
    }

    /// Attempts to insert an item with the given ID, scanning from the back.
    /// Returns an error if the ID already exists.
    pub fn try_insert_scan_from_back(&mut self, id: u16, item: T) -> Result<(), SequenceError> {
        let mut index = self.list.len();

        while index > 0 {
            let old_id = self.list[index - 1].0;
            if old_id == id {
                return Err(SequenceError::DuplicateId { id });
            }
            if sequence_less_than(old_id, id) {
                break;
            }
            index -= 1;
        }

        self.list.insert(index, (id, item));
        Ok(())
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }
}

impl<T> Default for SequenceList<T> {
    fn default() -> Self {
        Self::new()
    }
}
