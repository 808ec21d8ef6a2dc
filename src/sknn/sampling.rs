use crate::io::DatasetPosition;

/// Restricts a candidate pool to sessions strictly older than the query and
/// keeps only the `max_samples` most recent of them. The result is
/// de-duplicated and ascending.
pub fn restrict(
    mut candidates: Vec<DatasetPosition>,
    query_position: DatasetPosition,
    max_samples: usize,
) -> Vec<DatasetPosition> {
    candidates.sort_unstable();
    candidates.dedup();

    // causal cutoff
    candidates.retain(|position| *position < query_position);

    if candidates.len() > max_samples {
        let qty_too_old = candidates.len() - max_samples;
        candidates.drain(..qty_too_old);
    }

    // downstream tie-breaking relies on ascending iteration
    candidates.sort_unstable();
    candidates
}
