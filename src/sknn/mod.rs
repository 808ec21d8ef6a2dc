use std::cmp::Ordering;
use std::sync::Arc;

use itertools::Itertools;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::error::RetrievalError;
use crate::io::{CanonicalSessions, Dataset, DatasetPosition};
use crate::sknn::item_session_index::ItemSessionIndex;
use crate::sknn::similarity::{QueryProfile, SimilarityMeasure};

pub mod item_session_index;
pub mod sampling;
pub mod similarity;
pub mod stats;
pub mod top_k;

pub const DEFAULT_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MAX_SAMPLES: usize = 1000;

/// The neighbors found for one query session, most similar first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Neighborhood {
    NoNeighbors,
    Neighbors(Vec<DatasetPosition>),
}

impl Neighborhood {
    pub fn len(&self) -> usize {
        match self {
            Neighborhood::NoNeighbors => 0,
            Neighborhood::Neighbors(positions) => positions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn positions(&self) -> &[DatasetPosition] {
        match self {
            Neighborhood::NoNeighbors => &[],
            Neighborhood::Neighbors(positions) => positions.as_slice(),
        }
    }

    /// The persisted form: the literal `0` for "no neighbors", otherwise the
    /// comma separated positions.
    pub fn to_legacy_line(&self) -> String {
        match self {
            Neighborhood::NoNeighbors => String::from("0"),
            Neighborhood::Neighbors(positions) => positions.iter().join(","),
        }
    }

    pub fn from_legacy_line(line: &str) -> Option<Neighborhood> {
        let line = line.trim();
        if line == "0" {
            return Some(Neighborhood::NoNeighbors);
        }
        let positions = line
            .split(',')
            .map(|raw| raw.trim().parse::<u32>().ok().map(DatasetPosition))
            .collect::<Option<Vec<_>>>()?;
        Some(Neighborhood::Neighbors(positions))
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct SessionScore {
    pub position: DatasetPosition,
    pub score: f64,
}

impl SessionScore {
    fn new(position: DatasetPosition, score: f64) -> Self {
        SessionScore { position, score }
    }
}

impl Eq for SessionScore {}

impl Ord for SessionScore {
    fn cmp(&self, other: &Self) -> Ordering {
        // reverse order by score, older sessions first on equal scores
        match self.score.partial_cmp(&other.score) {
            Some(Ordering::Less) => Ordering::Greater,
            Some(Ordering::Greater) => Ordering::Less,
            _ => self.position.cmp(&other.position),
        }
    }
}

impl PartialOrd for SessionScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Validated settings of a retrieval run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    k: usize,
    threshold: f64,
    max_samples: usize,
    start_position: DatasetPosition,
    measure: SimilarityMeasure,
}

impl RetrievalConfig {
    pub fn new(
        k: usize,
        threshold: f64,
        max_samples: usize,
        start_position: DatasetPosition,
        measure: SimilarityMeasure,
    ) -> Result<Self, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::Configuration(String::from(
                "k must be a positive number of neighbors",
            )));
        }
        if max_samples == 0 {
            return Err(RetrievalError::Configuration(String::from(
                "max_samples must be positive",
            )));
        }
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(RetrievalError::Configuration(format!(
                "threshold {} is outside of [0, 1], the range of the {} measure",
                threshold, measure
            )));
        }
        Ok(RetrievalConfig {
            k,
            threshold,
            max_samples,
            start_position,
            measure,
        })
    }

    /// Cosine measure, threshold 0.5, 1000 samples, starting at position 0.
    pub fn with_defaults(k: usize) -> Result<Self, RetrievalError> {
        RetrievalConfig::new(
            k,
            DEFAULT_THRESHOLD,
            DEFAULT_MAX_SAMPLES,
            DatasetPosition(0),
            SimilarityMeasure::OverlapCosine,
        )
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn start_position(&self) -> DatasetPosition {
        self.start_position
    }

    pub fn measure(&self) -> SimilarityMeasure {
        self.measure
    }

    /// Fails when the start position lies beyond the end of the dataset.
    /// Starting exactly at the end is allowed and retrieves nothing.
    pub fn check_dataset(&self, dataset: &Dataset) -> Result<(), RetrievalError> {
        if self.start_position.index() > dataset.len() {
            return Err(RetrievalError::Configuration(format!(
                "start position {} is beyond the {} sessions of the dataset",
                self.start_position,
                dataset.len()
            )));
        }
        Ok(())
    }
}

/// Causal session kNN: for a session at position `p` only sessions at
/// positions below `p` can become neighbors.
pub struct CausalSkNN {
    index: Arc<ItemSessionIndex>,
    config: RetrievalConfig,
}

impl CausalSkNN {
    pub fn new(canonical_sessions: &CanonicalSessions, config: RetrievalConfig) -> Self {
        CausalSkNN::with_index(Arc::new(ItemSessionIndex::build(canonical_sessions)), config)
    }

    /// Reuses an index that was built before, e.g. when sweeping over k.
    pub fn with_index(index: Arc<ItemSessionIndex>, config: RetrievalConfig) -> Self {
        CausalSkNN { index, config }
    }

    pub fn find_neighbors(
        &self,
        dataset: &Dataset,
        position: DatasetPosition,
    ) -> Result<Neighborhood, RetrievalError> {
        let session = dataset
            .session(position)
            .ok_or(RetrievalError::PositionOutOfRange {
                position,
                dataset_len: dataset.len(),
            })?;
        // one feature item plus the target
        if session.len() < 2 {
            return Err(RetrievalError::InvalidSession {
                position,
                num_items: session.len(),
                required: 2,
            });
        }

        let query = QueryProfile::new(position, crate::io::feature_items(session))?;
        let candidates = self.index.find_candidates(query.items());
        let qty_candidates = candidates.len();
        let candidates = sampling::restrict(candidates, position, self.config.max_samples);
        tracing::trace!(
            position = position.0,
            qty_candidates,
            qty_sampled = candidates.len(),
            "restricted candidate pool"
        );

        top_k::select(
            &query,
            &candidates,
            dataset,
            self.config.measure,
            self.config.threshold,
            self.config.k,
        )
    }

    /// Neighborhoods for all sessions from the configured start position on,
    /// in position order.
    pub fn retrieve_all(&self, dataset: &Dataset) -> Result<Vec<Neighborhood>, RetrievalError> {
        self.retrieve_all_observed(dataset, || {})
    }

    /// Like [`CausalSkNN::retrieve_all`], calling `on_query` once per
    /// finished query, possibly from several threads.
    pub fn retrieve_all_observed<F>(
        &self,
        dataset: &Dataset,
        on_query: F,
    ) -> Result<Vec<Neighborhood>, RetrievalError>
    where
        F: Fn() + Sync,
    {
        let start = self.checked_start(dataset)?;
        (start..dataset.len())
            .into_par_iter()
            .map(|index| {
                let neighborhood = self.find_neighbors(dataset, DatasetPosition::from_index(index));
                on_query();
                neighborhood
            })
            .collect()
    }

    pub fn retrieve_all_sequential(
        &self,
        dataset: &Dataset,
    ) -> Result<Vec<Neighborhood>, RetrievalError> {
        let start = self.checked_start(dataset)?;
        (start..dataset.len())
            .map(|index| self.find_neighbors(dataset, DatasetPosition::from_index(index)))
            .collect()
    }

    fn checked_start(&self, dataset: &Dataset) -> Result<usize, RetrievalError> {
        self.config.check_dataset(dataset)?;
        Ok(self.config.start_position.index())
    }
}
