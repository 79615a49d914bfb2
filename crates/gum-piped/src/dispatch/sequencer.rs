//! Reorder buffer restoring arrival order of completed responses.

use std::collections::BTreeMap;

/// Releases items in sequence order regardless of completion order.
///
/// Items are pushed with the sequence number assigned when their request was
/// read. An item is released only once every item with a lower sequence
/// number has been released, so a slow request holds back all later ones.
#[derive(Debug)]
pub struct Sequencer<T> {
    next: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> Default for Sequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Sequencer<T> {
    /// Creates a sequencer expecting sequence number zero first.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Accepts a completed item and returns every item now ready, in order.
    pub fn push(&mut self, sequence: u64, item: T) -> Vec<T> {
        self.pending.insert(sequence, item);
        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push(item);
            self.next += 1;
        }
        ready
    }

    /// Sequence number the sequencer is waiting for.
    #[must_use]
    pub const fn next_sequence(&self) -> u64 {
        self.next
    }

    /// Number of completed items held back by an earlier one.
    #[must_use]
    pub fn held(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn releases_in_order_items_immediately() {
        let mut sequencer = Sequencer::new();
        assert_eq!(sequencer.push(0, "a"), vec!["a"]);
        assert_eq!(sequencer.push(1, "b"), vec!["b"]);
        assert_eq!(sequencer.next_sequence(), 2);
    }

    #[test]
    fn holds_later_items_until_the_gap_fills() {
        let mut sequencer = Sequencer::new();
        assert!(sequencer.push(2, "c").is_empty());
        assert!(sequencer.push(1, "b").is_empty());
        assert_eq!(sequencer.held(), 2);
        assert_eq!(sequencer.push(0, "a"), vec!["a", "b", "c"]);
        assert_eq!(sequencer.held(), 0);
    }

    #[rstest]
    #[case(vec![3, 1, 0, 2, 4])]
    #[case(vec![4, 3, 2, 1, 0])]
    #[case(vec![0, 2, 1, 4, 3])]
    fn output_order_matches_sequence_order(#[case] completion: Vec<u64>) {
        let mut sequencer = Sequencer::new();
        let released: Vec<u64> = completion
            .into_iter()
            .flat_map(|sequence| sequencer.push(sequence, sequence))
            .collect();
        assert_eq!(released, vec![0, 1, 2, 3, 4]);
    }
}
