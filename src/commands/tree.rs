use crate::error::Result;
use crate::filter::{Filter, FilterPipeline};
use crate::range::{TimeRange, parse_timestamp};
use crate::remote::TimeResponse;
use crate::storage;
use crate::tree::aggregate::build_dataset;
use crate::tree::{CallTree, Dataset};
use comfy_table::{CellAlignment, Table, presets};
use std::path::Path;

/// Options for printing a call tree
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    pub start: Option<String>,
    pub end: Option<String>,
    pub thread: Option<String>,
    pub merge_threads: bool,
    pub show_uninteresting: bool,
    pub hide_imports: bool,
    pub depth: Option<usize>,
    pub json: bool,
}

impl TreeOptions {
    /// Time window to aggregate over. Open ends extend to the whole capture.
    fn range(&self) -> Result<Option<TimeRange>> {
        if self.start.is_none() && self.end.is_none() {
            return Ok(None);
        }
        let start = self.start.as_deref().map(parse_timestamp).transpose()?;
        let end = self.end.as_deref().map(parse_timestamp).transpose()?;
        Ok(Some(TimeRange::new(
            start.unwrap_or(i64::MIN),
            end.unwrap_or(i64::MAX),
        )))
    }

    fn pipeline(&self) -> FilterPipeline {
        let mut pipeline = FilterPipeline::new();
        if let Some(thread) = &self.thread {
            pipeline.register(Filter::Thread(thread.clone()));
        }
        if !self.show_uninteresting {
            pipeline.register(Filter::Uninteresting);
        }
        if self.hide_imports {
            pipeline.register(Filter::ImportSystem);
        }
        pipeline
    }
}

/// Aggregate and filter the profile's call tree
pub fn load(file: &Path, options: &TreeOptions) -> Result<Dataset> {
    let conn = storage::open(file)?;
    let range = options.range()?;
    let records = storage::load_allocations(&conn, range)?;
    log::info!("Aggregating {} allocation records", records.len());

    let dataset = build_dataset(records, options.merge_threads);
    let filtered = options.pipeline().apply(&dataset.root);
    Ok(Dataset {
        root: filtered,
        unique_threads: dataset.unique_threads,
    })
}

/// Nodes in print order with their depth, stopping below `max_depth`
fn flatten(root: &CallTree, max_depth: Option<usize>) -> Vec<(usize, &CallTree)> {
    let mut rows = Vec::new();
    let mut stack = vec![(0usize, root)];
    while let Some((depth, node)) = stack.pop() {
        rows.push((depth, node));
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        stack.extend(node.children.iter().rev().map(|child| (depth + 1, child)));
    }
    rows
}

/// Run the tree command
pub fn run(file: &Path, options: &TreeOptions) -> Result<()> {
    let dataset = load(file, options)?;

    if options.json {
        let response = TimeResponse { data: dataset };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let total = dataset.root.value.max(1) as f64;
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_header(vec!["SIZE", "%", "ALLOCS", "FRAME", "LOCATION"]);

    for (depth, node) in flatten(&dataset.root, options.depth) {
        let location = node
            .location
            .as_ref()
            .map(|loc| loc.to_string())
            .unwrap_or_default();
        table.add_row(vec![
            crate::tui::format_bytes(node.value),
            format!("{:.1}", node.value as f64 * 100.0 / total),
            node.n_allocations.to_string(),
            format!("{}{}", "  ".repeat(depth), node.name),
            location,
        ]);
    }
    for index in 0..3 {
        if let Some(column) = table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }

    println!("{table}");
    if !options.merge_threads && dataset.unique_threads.len() > 1 {
        eprintln!("Threads: {}", dataset.unique_threads.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::two_thread_tree;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flatten_order_and_depth() {
        let tree = two_thread_tree();
        let rows: Vec<(usize, &str)> = flatten(&tree, None)
            .into_iter()
            .map(|(d, n)| (d, n.name.as_str()))
            .collect();
        assert_eq!(
            rows,
            vec![(0, "<root>"), (1, "a"), (2, "a1"), (2, "a2"), (1, "b"), (2, "b1")]
        );

        assert_eq!(flatten(&tree, Some(1)).len(), 3);
    }

    #[test]
    fn test_open_ended_range() {
        let options = TreeOptions {
            start: Some("1000".into()),
            ..Default::default()
        };
        assert_eq!(options.range().unwrap(), Some(TimeRange::new(1000, i64::MAX)));
        assert_eq!(TreeOptions::default().range().unwrap(), None);
    }
}
