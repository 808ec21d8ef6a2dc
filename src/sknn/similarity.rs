use std::fmt;
use std::str::FromStr;

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;

use crate::error::RetrievalError;
use crate::io::{DatasetPosition, ItemId};

/// Scores are rounded to this many decimals before they are compared to
/// the threshold, which keeps the output identical to the reference runs.
const SCORE_DECIMALS: i32 = 4;

/// The similarity measures a query can be scored with. All of them share
/// one call contract and produce values in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityMeasure {
    /// `|A ∩ B| / (sqrt(|A|) * sqrt(|B|))` over the distinct items, i.e. the
    /// cosine of the one-hot item vectors.
    OverlapCosine,
    /// `|A ∩ B| / |A ∪ B|` over the distinct items.
    Jaccard,
    /// Sum of the position weights of the shared query items, divided by the
    /// number of distinct query items.
    PositionWeighted,
}

impl Default for SimilarityMeasure {
    fn default() -> Self {
        SimilarityMeasure::OverlapCosine
    }
}

impl FromStr for SimilarityMeasure {
    type Err = RetrievalError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "cosine" | "overlap_cosine" => Ok(SimilarityMeasure::OverlapCosine),
            "jaccard" => Ok(SimilarityMeasure::Jaccard),
            "position_weighted" | "vec" => Ok(SimilarityMeasure::PositionWeighted),
            other => Err(RetrievalError::Configuration(format!(
                "unknown similarity measure '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SimilarityMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimilarityMeasure::OverlapCosine => "cosine",
            SimilarityMeasure::Jaccard => "jaccard",
            SimilarityMeasure::PositionWeighted => "position_weighted",
        };
        write!(f, "{}", name)
    }
}

/// Everything a measure needs to know about the query session: its distinct
/// items and, per item, the weight `rank / length` of its last occurrence.
#[derive(Debug, Clone)]
pub struct QueryProfile {
    items: HashSet<ItemId>,
    // distinct items in order of first click, summed in this order
    position_weights: Vec<(ItemId, f64)>,
}

impl QueryProfile {
    pub fn new(position: DatasetPosition, session_items: &[ItemId]) -> Result<Self, RetrievalError> {
        if session_items.is_empty() {
            return Err(RetrievalError::InvalidSession {
                position,
                num_items: 0,
                required: 1,
            });
        }

        let length = session_items.len() as f64;
        let mut last_click_weights: HashMap<ItemId, f64> =
            HashMap::with_capacity(session_items.len());
        for (rank, item_id) in session_items.iter().enumerate() {
            last_click_weights.insert(*item_id, (rank + 1) as f64 / length);
        }
        let position_weights = session_items
            .iter()
            .unique()
            .map(|item_id| (*item_id, last_click_weights[item_id]))
            .collect();

        Ok(QueryProfile {
            items: session_items.iter().copied().collect(),
            position_weights,
        })
    }

    pub fn items(&self) -> &HashSet<ItemId> {
        &self.items
    }

    pub fn position_weights(&self) -> &[(ItemId, f64)] {
        &self.position_weights
    }
}

impl SimilarityMeasure {
    /// Scores the query against a candidate session, rounded to four
    /// decimals. Fails if the candidate session holds no items.
    pub fn score(
        &self,
        query: &QueryProfile,
        candidate_position: DatasetPosition,
        candidate_items: &[ItemId],
    ) -> Result<f64, RetrievalError> {
        if candidate_items.is_empty() {
            return Err(RetrievalError::InvalidSession {
                position: candidate_position,
                num_items: 0,
                required: 1,
            });
        }
        let candidate: HashSet<ItemId> = candidate_items.iter().copied().collect();

        let similarity = match self {
            SimilarityMeasure::OverlapCosine => overlap_cosine(query.items(), &candidate),
            SimilarityMeasure::Jaccard => jaccard(query.items(), &candidate),
            SimilarityMeasure::PositionWeighted => {
                position_weighted(query.position_weights(), &candidate)
            }
        };

        Ok(round_score(similarity))
    }
}

fn intersection_size(first: &HashSet<ItemId>, second: &HashSet<ItemId>) -> usize {
    let (smaller, larger) = if first.len() <= second.len() {
        (first, second)
    } else {
        (second, first)
    };
    smaller.iter().filter(|item_id| larger.contains(*item_id)).count()
}

fn overlap_cosine(first: &HashSet<ItemId>, second: &HashSet<ItemId>) -> f64 {
    let qty_shared = intersection_size(first, second) as f64;
    qty_shared / ((first.len() as f64).sqrt() * (second.len() as f64).sqrt())
}

fn jaccard(first: &HashSet<ItemId>, second: &HashSet<ItemId>) -> f64 {
    let qty_shared = intersection_size(first, second);
    let qty_union = first.len() + second.len() - qty_shared;
    qty_shared as f64 / qty_union as f64
}

fn position_weighted(position_weights: &[(ItemId, f64)], candidate: &HashSet<ItemId>) -> f64 {
    let weight_sum: f64 = position_weights
        .iter()
        .filter(|(item_id, _)| candidate.contains(item_id))
        .map(|(_, weight)| weight)
        .sum();
    // divides by the distinct query items, not the query length
    weight_sum / position_weights.len() as f64
}

fn round_score(similarity: f64) -> f64 {
    let scale = 10_f64.powi(SCORE_DECIMALS);
    (similarity * scale).round_ties_even() / scale
}
