use std::collections::BinaryHeap;

use crate::error::RetrievalError;
use crate::io::{Dataset, DatasetPosition};
use crate::sknn::similarity::{QueryProfile, SimilarityMeasure};
use crate::sknn::{Neighborhood, SessionScore};

/// Scores the candidates against the query, drops those below `threshold`
/// and keeps the `k` best, ranked by descending score. Candidates must be
/// ascending; on equal scores the lower position wins.
pub fn select(
    query: &QueryProfile,
    candidates: &[DatasetPosition],
    dataset: &Dataset,
    measure: SimilarityMeasure,
    threshold: f64,
    k: usize,
) -> Result<Neighborhood, RetrievalError> {
    // The heap keeps the worst retained neighbor on top.
    let mut closest_neighbors: BinaryHeap<SessionScore> =
        BinaryHeap::with_capacity(k.min(candidates.len()));

    for candidate_position in candidates {
        let candidate_items =
            dataset
                .session(*candidate_position)
                .ok_or(RetrievalError::PositionOutOfRange {
                    position: *candidate_position,
                    dataset_len: dataset.len(),
                })?;

        let score = measure.score(query, *candidate_position, candidate_items)?;
        if score < threshold {
            continue;
        }

        let scored_session = SessionScore::new(*candidate_position, score);
        if closest_neighbors.len() < k {
            closest_neighbors.push(scored_session);
        } else if let Some(mut bottom) = closest_neighbors.peek_mut() {
            if scored_session < *bottom {
                *bottom = scored_session;
            }
        }
    }

    if closest_neighbors.is_empty() {
        return Ok(Neighborhood::NoNeighbors);
    }

    let ranked = closest_neighbors
        .into_sorted_vec()
        .into_iter()
        .map(|scored| scored.position)
        .collect();
    Ok(Neighborhood::Neighbors(ranked))
}

#[cfg(test)]
mod top_k_test {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::new(vec![
            vec![1, 2, 3],
            vec![2, 3, 4],
            vec![1, 4, 5],
            vec![3, 4, 6],
            vec![3, 4, 9],
            vec![3, 8],
        ])
    }

    fn positions(raw: &[u32]) -> Vec<DatasetPosition> {
        raw.iter().copied().map(DatasetPosition).collect()
    }

    #[test]
    fn should_rank_by_descending_score() {
        let query = QueryProfile::new(DatasetPosition(6), &[3, 4]).unwrap();
        // scores: 0 -> 0.4082, 1 -> 0.8165, 3 -> 0.8165, 5 -> 0.5
        let neighborhood = select(
            &query,
            &positions(&[0, 1, 3, 5]),
            &dataset(),
            SimilarityMeasure::OverlapCosine,
            0.0,
            10,
        )
        .unwrap();
        assert_eq!(Neighborhood::Neighbors(positions(&[1, 3, 5, 0])), neighborhood);
    }

    #[test]
    fn should_prefer_lower_position_on_ties_when_truncating() {
        let query = QueryProfile::new(DatasetPosition(6), &[3, 4]).unwrap();
        let neighborhood = select(
            &query,
            &positions(&[1, 3, 4]),
            &dataset(),
            SimilarityMeasure::OverlapCosine,
            0.5,
            2,
        )
        .unwrap();
        assert_eq!(Neighborhood::Neighbors(positions(&[1, 3])), neighborhood);
    }

    #[test]
    fn should_keep_scores_equal_to_threshold() {
        let query = QueryProfile::new(DatasetPosition(6), &[3, 4]).unwrap();
        let neighborhood = select(
            &query,
            &positions(&[5]),
            &dataset(),
            SimilarityMeasure::OverlapCosine,
            0.5,
            3,
        )
        .unwrap();
        assert_eq!(Neighborhood::Neighbors(positions(&[5])), neighborhood);
    }

    #[test]
    fn should_return_sentinel_without_qualifying_candidates() {
        let query = QueryProfile::new(DatasetPosition(2), &[1, 4]).unwrap();
        let neighborhood = select(
            &query,
            &positions(&[0, 1]),
            &dataset(),
            SimilarityMeasure::OverlapCosine,
            0.5,
            2,
        )
        .unwrap();
        assert_eq!(Neighborhood::NoNeighbors, neighborhood);
        assert_eq!("0", neighborhood.to_legacy_line());

        let empty_pool = select(
            &query,
            &[],
            &dataset(),
            SimilarityMeasure::OverlapCosine,
            0.5,
            2,
        )
        .unwrap();
        assert_eq!(Neighborhood::NoNeighbors, empty_pool);
    }

    #[test]
    fn should_fail_for_positions_outside_dataset() {
        let query = QueryProfile::new(DatasetPosition(2), &[1, 4]).unwrap();
        let result = select(
            &query,
            &positions(&[42]),
            &dataset(),
            SimilarityMeasure::Jaccard,
            0.5,
            2,
        );
        assert_eq!(
            Err(RetrievalError::PositionOutOfRange {
                position: DatasetPosition(42),
                dataset_len: 6
            }),
            result
        );
    }
}
