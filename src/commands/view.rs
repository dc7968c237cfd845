use crate::error::Result;
use crate::remote::{HttpAggregator, LocalAggregator, Reaggregate};
use crate::session::Session;
use crate::storage;
use crate::tree::aggregate::build_dataset;
use crate::tui::{self, ViewerConfig};
use std::path::Path;
use std::sync::Arc;

/// Load a profile into a viewing session
pub fn load_session(file: &Path, merge_threads: bool) -> Result<Session> {
    let conn = storage::open(file)?;
    let series = storage::load_memory_series(&conn)?;
    let records = storage::load_allocations(&conn, None)?;
    let dataset = build_dataset(records, merge_threads);

    let label = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());

    log::info!(
        "Loaded {}: {} nodes, {} threads, {} memory samples",
        label,
        dataset.root.node_count(),
        dataset.unique_threads.len(),
        series.len()
    );
    Ok(Session::new(dataset, series, merge_threads, label))
}

/// Run the view command - opens a profile in the interactive viewer
pub fn run(
    file: &Path,
    endpoint: Option<&str>,
    merge_threads: bool,
    config: ViewerConfig,
) -> Result<()> {
    let session = load_session(file, merge_threads)?;

    let source: Arc<dyn Reaggregate> = match endpoint {
        Some(endpoint) => {
            log::info!("Re-aggregating through {endpoint}");
            Arc::new(HttpAggregator::new(endpoint)?)
        }
        None => Arc::new(LocalAggregator::new(file, merge_threads)),
    };

    tui::run(session, source, config)
}
