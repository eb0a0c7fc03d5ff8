//! Majority-vote debounce over recent classifier outputs.

use std::collections::VecDeque;

pub type ClassId = usize;

pub const DEFAULT_HISTORY_LEN: usize = 16;

/// Bounded FIFO of class ids.
#[derive(Debug, Clone)]
pub struct LabelHistory {
    ids: VecDeque<ClassId>,
    capacity: usize,
}

impl Default for LabelHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl LabelHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, id: ClassId) {
        if self.ids.len() == self.capacity {
            self.ids.pop_front();
        }
        self.ids.push_back(id);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Most frequent id; ties go to the id seen first in the current history.
    pub fn majority(&self) -> Option<ClassId> {
        // (id, count) in order of first appearance
        let mut tally: Vec<(ClassId, usize)> = Vec::new();
        for &id in &self.ids {
            match tally.iter_mut().find(|(seen, _)| *seen == id) {
                Some((_, n)) => *n += 1,
                None => tally.push((id, 1)),
            }
        }

        let mut best: Option<(ClassId, usize)> = None;
        for (id, n) in tally {
            if best.is_none_or(|(_, top)| n > top) {
                best = Some((id, n));
            }
        }
        best.map(|(id, _)| id)
    }
}

#[cfg(test)]
impl LabelHistory {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Record `raw_id` and return the current majority.
pub fn record_and_resolve(history: &mut LabelHistory, raw_id: ClassId) -> ClassId {
    history.push(raw_id);
    history.majority().unwrap_or(raw_id)
}
