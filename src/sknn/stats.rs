use tdigest::TDigest;

use crate::sknn::Neighborhood;

/// Summary of the neighborhoods of one retrieval run. Sessions without
/// neighbors count with length zero.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborhoodStats {
    pub qty_sessions: usize,
    pub qty_with_neighbors: usize,
    pub mean_length: f64,
    pub length_p50: f64,
    pub length_p90: f64,
    pub length_p99: f64,
}

impl NeighborhoodStats {
    pub fn from_neighborhoods(neighborhoods: &[Neighborhood]) -> Self {
        let qty_sessions = neighborhoods.len();
        if qty_sessions == 0 {
            return NeighborhoodStats {
                qty_sessions: 0,
                qty_with_neighbors: 0,
                mean_length: 0.0,
                length_p50: 0.0,
                length_p90: 0.0,
                length_p99: 0.0,
            };
        }

        let lengths: Vec<f64> = neighborhoods
            .iter()
            .map(|neighborhood| neighborhood.len() as f64)
            .collect();
        let qty_with_neighbors = neighborhoods
            .iter()
            .filter(|neighborhood| !neighborhood.is_empty())
            .count();
        let mean_length = lengths.iter().sum::<f64>() / qty_sessions as f64;

        let length_digest = TDigest::new_with_size(100).merge_unsorted(lengths);

        NeighborhoodStats {
            qty_sessions,
            qty_with_neighbors,
            mean_length,
            length_p50: length_digest.estimate_quantile(0.50),
            length_p90: length_digest.estimate_quantile(0.90),
            length_p99: length_digest.estimate_quantile(0.99),
        }
    }

    pub fn share_with_neighbors(&self) -> f64 {
        if self.qty_sessions > 0 {
            self.qty_with_neighbors as f64 / self.qty_sessions as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod stats_test {
    use float_cmp::approx_eq;

    use super::*;
    use crate::io::DatasetPosition;

    #[test]
    fn should_count_sentinels_as_empty() {
        let neighborhoods = vec![
            Neighborhood::NoNeighbors,
            Neighborhood::Neighbors(vec![DatasetPosition(0), DatasetPosition(1)]),
            Neighborhood::Neighbors(vec![DatasetPosition(2)]),
            Neighborhood::NoNeighbors,
        ];
        let stats = NeighborhoodStats::from_neighborhoods(&neighborhoods);

        assert_eq!(4, stats.qty_sessions);
        assert_eq!(2, stats.qty_with_neighbors);
        assert!(approx_eq!(f64, 0.75, stats.mean_length, ulps = 2));
        assert!(approx_eq!(f64, 0.5, stats.share_with_neighbors(), ulps = 2));
        assert!(stats.length_p99 <= 2.0);
    }

    #[test]
    fn should_handle_empty_runs() {
        let stats = NeighborhoodStats::from_neighborhoods(&[]);
        assert_eq!(0, stats.qty_sessions);
        assert_eq!(0.0, stats.share_with_neighbors());
    }
}
