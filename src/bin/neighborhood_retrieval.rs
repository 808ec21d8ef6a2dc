use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use num_format::{Locale, ToFormattedString};
use tracing::info;

use serenade_neighbors::config::AppConfig;
use serenade_neighbors::io;
use serenade_neighbors::sknn::item_session_index::ItemSessionIndex;
use serenade_neighbors::sknn::stats::NeighborhoodStats;
use serenade_neighbors::sknn::CausalSkNN;

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_default();
    let config = AppConfig::new(config_path)?;

    setup_logging(&config.log.level);

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.runtime.num_workers)
        .build_global()
        .context("unable to start the worker pool")?;

    // every k is validated before any work is done
    let retrieval_configs = config.model.retrieval_configs()?;

    let start_time = Instant::now();
    let dataset = io::read_dataset(&config.data.dataset_path)
        .with_context(|| format!("reading dataset {}", config.data.dataset_path))?;
    let canonical_sessions = io::read_canonical_sessions(&config.data.canonical_path)
        .with_context(|| format!("reading canonical sessions {}", config.data.canonical_path))?;
    canonical_sessions.check_positions(&dataset)?;
    for retrieval_config in &retrieval_configs {
        retrieval_config.check_dataset(&dataset)?;
    }
    info!(
        sessions = %dataset.len().to_formatted_string(&Locale::en),
        canonical_sessions = %canonical_sessions.len().to_formatted_string(&Locale::en),
        millis = start_time.elapsed().as_millis() as u64,
        "loaded sessions"
    );

    let start_time = Instant::now();
    let index = Arc::new(ItemSessionIndex::build(&canonical_sessions));
    info!(
        items = %index.qty_items().to_formatted_string(&Locale::en),
        postings = %index.qty_postings().to_formatted_string(&Locale::en),
        millis = start_time.elapsed().as_millis() as u64,
        "built item session index"
    );

    let output_dir = Path::new(&config.data.output_dir);
    for retrieval_config in retrieval_configs {
        let k = retrieval_config.k();
        let qty_queries = dataset
            .len()
            .saturating_sub(retrieval_config.start_position().index());
        info!(
            k,
            threshold = retrieval_config.threshold(),
            max_samples = retrieval_config.max_samples(),
            measure = %retrieval_config.measure(),
            "retrieving neighborhoods"
        );

        let sknn = CausalSkNN::with_index(index.clone(), retrieval_config);
        let progress = ProgressBar::new(qty_queries as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("Process_seqs: [{pos}/{len}] {percent}% {elapsed_precise} {wide_bar}"),
        );
        progress.set_draw_delta((qty_queries as u64 / 100).max(1));

        let start_time = Instant::now();
        let neighborhoods = sknn.retrieve_all_observed(&dataset, || progress.inc(1))?;
        progress.finish_and_clear();

        let text_path = output_dir.join(format!("neigh_data_{}.txt", k));
        io::write_neighborhoods_text(&text_path, &neighborhoods)?;
        let bin_path = output_dir.join(format!("neigh_data_{}.bin", k));
        io::write_neighborhoods_bincode(&bin_path, &neighborhoods)?;

        let stats = NeighborhoodStats::from_neighborhoods(&neighborhoods);
        info!(
            k,
            sessions = stats.qty_sessions,
            with_neighbors = %format!("{:.4}", stats.share_with_neighbors()),
            mean_length = %format!("{:.4}", stats.mean_length),
            p50 = stats.length_p50,
            p90 = stats.length_p90,
            p99 = stats.length_p99,
            secs = start_time.elapsed().as_secs(),
            output = %text_path.display(),
            "stored neighborhoods"
        );
    }

    Ok(())
}

fn setup_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
