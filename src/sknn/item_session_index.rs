use hashbrown::{HashMap, HashSet};
use itertools::Itertools;

use crate::io::{feature_items, CanonicalSessions, DatasetPosition, ItemId};

/// Inverted index from an item to the dataset positions of the canonical
/// sessions that contain the item among their feature items.
///
/// Built once and never mutated afterwards, so it can be shared between
/// the rayon workers that answer the queries.
#[derive(Debug, Default)]
pub struct ItemSessionIndex {
    sessions_for_item: HashMap<ItemId, Vec<DatasetPosition>>,
}

impl ItemSessionIndex {
    pub fn build(canonical_sessions: &CanonicalSessions) -> Self {
        let mut sessions_for_item: HashMap<ItemId, Vec<DatasetPosition>> = HashMap::new();

        for (_canonical_position, dataset_position, session) in canonical_sessions.iter() {
            // the target item of a canonical session is never indexed
            for item_id in feature_items(session).iter().unique() {
                sessions_for_item
                    .entry(*item_id)
                    .or_insert_with(Vec::new)
                    .push(dataset_position);
            }
        }

        ItemSessionIndex { sessions_for_item }
    }

    pub fn sessions_for_item(&self, item_id: &ItemId) -> Option<&[DatasetPosition]> {
        self.sessions_for_item
            .get(item_id)
            .map(|positions| positions.as_slice())
    }

    /// Concatenates the index entries of all given items. The result may
    /// contain the same position more than once. Unknown items add nothing.
    pub fn find_candidates(&self, session_items: &HashSet<ItemId>) -> Vec<DatasetPosition> {
        let mut candidates = Vec::new();
        for item_id in session_items.iter() {
            if let Some(positions) = self.sessions_for_item(item_id) {
                candidates.extend_from_slice(positions);
            }
        }
        candidates
    }

    pub fn qty_items(&self) -> usize {
        self.sessions_for_item.len()
    }

    pub fn qty_postings(&self) -> usize {
        self.sessions_for_item.values().map(|positions| positions.len()).sum()
    }
}

#[cfg(test)]
mod item_session_index_test {
    use super::*;

    fn canonical(sessions: Vec<Vec<ItemId>>, positions: Vec<u32>) -> CanonicalSessions {
        CanonicalSessions::new(
            sessions,
            positions.into_iter().map(DatasetPosition).collect(),
        )
        .unwrap()
    }

    #[test]
    fn should_index_feature_items_only() {
        let index = ItemSessionIndex::build(&canonical(
            vec![vec![1, 2, 3], vec![2, 3, 4]],
            vec![0, 1],
        ));

        assert_eq!(Some(&[DatasetPosition(0)][..]), index.sessions_for_item(&1));
        assert_eq!(
            Some(&[DatasetPosition(0), DatasetPosition(1)][..]),
            index.sessions_for_item(&2)
        );
        assert_eq!(Some(&[DatasetPosition(1)][..]), index.sessions_for_item(&3));
        // 4 is only ever a target
        assert_eq!(None, index.sessions_for_item(&4));
    }

    #[test]
    fn should_store_dataset_positions_not_canonical_positions() {
        let index = ItemSessionIndex::build(&canonical(
            vec![vec![7, 8, 9], vec![8, 10, 11]],
            vec![12, 40],
        ));

        assert_eq!(Some(&[DatasetPosition(12)][..]), index.sessions_for_item(&7));
        assert_eq!(
            Some(&[DatasetPosition(12), DatasetPosition(40)][..]),
            index.sessions_for_item(&8)
        );
    }

    #[test]
    fn should_add_each_session_once_per_item() {
        let index = ItemSessionIndex::build(&canonical(vec![vec![5, 5, 6, 5, 1]], vec![3]));

        assert_eq!(Some(&[DatasetPosition(3)][..]), index.sessions_for_item(&5));
        assert_eq!(2, index.qty_items());
        assert_eq!(2, index.qty_postings());
    }

    #[test]
    fn should_build_empty_index_from_empty_canonical_set() {
        let index = ItemSessionIndex::build(&CanonicalSessions::default());
        assert_eq!(0, index.qty_items());
        assert!(index.find_candidates(&[1_u64, 2].iter().copied().collect()).is_empty());
    }

    #[test]
    fn should_ignore_unknown_items_when_finding_candidates() {
        let index = ItemSessionIndex::build(&canonical(
            vec![vec![1, 2, 3], vec![2, 3, 4], vec![1, 4, 5]],
            vec![0, 1, 2],
        ));
        let session_items: HashSet<ItemId> = [1_u64, 2, 999].iter().copied().collect();

        let mut candidates = index.find_candidates(&session_items);
        candidates.sort();
        assert_eq!(
            vec![
                DatasetPosition(0),
                DatasetPosition(0),
                DatasetPosition(1),
                DatasetPosition(2)
            ],
            candidates
        );
    }
}
