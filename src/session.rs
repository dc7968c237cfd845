//! Wires user controls to the filter, navigation and range controllers.

use crate::annotation;
use crate::error::Error;
use crate::filter::{Filter, FilterKind, FilterPipeline};
use crate::navigation::{History, NavigationController};
use crate::range::{Completion, RangeSelection, RefreshRequest, RelayoutEvent, TimeRange};
use crate::remote::RefreshResponse;
use crate::render::{FlameGraph, TimeSeriesChart};
use crate::series::TimeSeries;
use crate::tree::{ALL_THREADS, CallTree, Dataset, NodeId};
use std::time::{Duration, Instant};

/// Everything loaded for one viewing session
#[derive(Debug, Clone)]
pub struct Session {
    dataset: Dataset,
    series: TimeSeries,
    merge_threads: bool,
    label: String,
}

impl Session {
    pub fn new(
        dataset: Dataset,
        series: TimeSeries,
        merge_threads: bool,
        label: impl Into<String>,
    ) -> Self {
        Session {
            dataset,
            series,
            merge_threads,
            label: label.into(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn tree(&self) -> &CallTree {
        &self.dataset.root
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn merge_threads(&self) -> bool {
        self.merge_threads
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn replace_dataset(&mut self, dataset: Dataset) {
        self.dataset = dataset;
    }

    /// Threads offered by the thread picker, or `None` when there is
    /// nothing to choose between
    pub fn thread_choices(&self) -> Option<&[String]> {
        if self.merge_threads || self.dataset.unique_threads.len() < 2 {
            return None;
        }
        Some(&self.dataset.unique_threads)
    }
}

/// Interactive state machine behind the viewer. Generic over the widgets so
/// it can be driven by the terminal UI or by tests.
pub struct Viewer<F, C, H> {
    session: Session,
    pipeline: FilterPipeline,
    nav: NavigationController,
    range: RangeSelection,
    flame: F,
    chart: C,
    history: H,
    selected_thread: Option<String>,
    last_error: Option<String>,
}

impl<F, C, H> Viewer<F, C, H>
where
    F: FlameGraph,
    C: TimeSeriesChart,
    H: History,
{
    pub fn new(session: Session, flame: F, chart: C, history: H, debounce: Duration) -> Self {
        Viewer {
            session,
            pipeline: FilterPipeline::new(),
            nav: NavigationController::new(),
            range: RangeSelection::new(debounce),
            flame,
            chart,
            history,
            selected_thread: None,
            last_error: None,
        }
    }

    /// Initial draw: annotate the whole capture, hide uninteresting frames,
    /// render, then restore the zoom named by the history.
    pub fn start(&mut self) {
        if let Some(full) = self.session.series().full_range() {
            self.annotate(full);
        }
        self.pipeline.register(Filter::Uninteresting);
        self.redraw();
        self.nav.restore(&mut self.flame, &self.history);
    }

    fn annotate(&mut self, range: TimeRange) {
        self.range.suppress_next();
        annotation::update(&mut self.chart, self.session.series(), range);
    }

    /// Re-derive the displayed tree from the dataset and active filters
    pub fn redraw(&mut self) {
        let tree = self.pipeline.apply(self.session.tree());
        self.flame.render(tree);
        self.flame.refresh();
        self.nav.sync(&self.flame);
    }

    pub fn on_node_click(&mut self, id: NodeId) {
        let Some(name) = self.flame.find_by_id(id).map(|n| n.name.clone()) else {
            return;
        };
        self.nav.click(id, &name, &mut self.flame, &mut self.history);
    }

    pub fn on_reset_zoom(&mut self) {
        self.nav.reset(&mut self.flame, &mut self.history);
    }

    pub fn on_invert(&mut self) {
        self.nav.invert(&mut self.flame, &mut self.history);
    }

    /// The history moved (back/forward)
    pub fn on_pop_state(&mut self) {
        self.nav.restore(&mut self.flame, &self.history);
    }

    pub fn on_filter_thread(&mut self, thread: &str) {
        if thread == ALL_THREADS {
            self.pipeline.unregister(FilterKind::Thread);
            self.selected_thread = None;
        } else {
            self.pipeline.register(Filter::Thread(thread.to_string()));
            self.selected_thread = Some(thread.to_string());
        }
        self.redraw();
    }

    pub fn set_hide_uninteresting(&mut self, hide: bool) {
        self.toggle(Filter::Uninteresting, hide);
    }

    pub fn set_hide_import_system(&mut self, hide: bool) {
        self.toggle(Filter::ImportSystem, hide);
    }

    fn toggle(&mut self, filter: Filter, enabled: bool) {
        if enabled {
            self.pipeline.register(filter);
        } else {
            self.pipeline.unregister(filter.kind());
        }
        self.redraw();
    }

    pub fn on_search(&mut self, term: &str) {
        self.flame.search(term);
    }

    pub fn on_resize(&mut self, width: u16) {
        self.flame.set_width(width);
        self.flame.refresh();
    }

    pub fn on_relayout(&mut self, event: &RelayoutEvent, now: Instant) -> bool {
        self.range.on_relayout(event, now)
    }

    /// A request to dispatch, once the debounce window has elapsed
    pub fn poll_refresh(&mut self, now: Instant) -> Option<RefreshRequest> {
        self.range.poll(now)
    }

    pub fn on_refresh_response(&mut self, response: RefreshResponse) {
        if self.range.complete(response.seq, response.range) == Completion::Stale {
            return;
        }
        match response.result {
            Ok(dataset) => {
                log::info!(
                    "Loaded {} nodes for {}",
                    dataset.root.node_count(),
                    response.range
                );
                self.last_error = None;
                // Ids are renumbered per dataset, so an old zoom id means nothing
                self.nav.reset(&mut self.flame, &mut self.history);
                self.session.replace_dataset(dataset);
                if self
                    .selected_thread
                    .as_ref()
                    .is_some_and(|t| !self.session.dataset().unique_threads.contains(t))
                {
                    log::warn!("Selected thread is absent from the refreshed range");
                }
                self.redraw();
                self.annotate(response.range);
            }
            Err(e) => {
                log::error!("Re-aggregation for {} failed: {e}", response.range);
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// The request never reached a worker; settle it like a failed response
    pub fn on_dispatch_failed(&mut self, request: RefreshRequest, error: Error) {
        log::error!("Could not start re-aggregation for {}: {error}", request.range);
        self.on_refresh_response(RefreshResponse {
            seq: request.seq,
            range: request.range,
            result: Err(error),
        });
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn pipeline(&self) -> &FilterPipeline {
        &self.pipeline
    }

    pub fn current_id(&self) -> NodeId {
        self.nav.current_id()
    }

    pub fn reset_enabled(&self) -> bool {
        self.nav.reset_enabled()
    }

    pub fn is_loading(&self) -> bool {
        self.range.is_loading()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.range.deadline()
    }

    pub fn current_range(&self) -> Option<TimeRange> {
        self.range.current()
    }

    pub fn hide_uninteresting(&self) -> bool {
        self.pipeline.is_active(FilterKind::Uninteresting)
    }

    pub fn hide_import_system(&self) -> bool {
        self.pipeline.is_active(FilterKind::ImportSystem)
    }

    pub fn selected_thread(&self) -> Option<&str> {
        self.selected_thread.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn flame(&self) -> &F {
        &self.flame
    }

    pub fn flame_mut(&mut self) -> &mut F {
        &mut self.flame
    }

    pub fn chart(&self) -> &C {
        &self.chart
    }

    pub fn chart_mut(&mut self) -> &mut C {
        &mut self.chart
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut H {
        &mut self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::HighWaterMark;
    use crate::navigation::HistoryStack;
    use crate::navigation::tests::FakeFlame;
    use crate::series::MemorySample;
    use crate::tree::tests::two_thread_tree;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct FakeChart {
        ranges: Vec<TimeRange>,
        marks: Vec<HighWaterMark>,
    }

    impl TimeSeriesChart for FakeChart {
        fn show_range(&mut self, range: TimeRange) {
            self.ranges.push(range);
        }

        fn annotate(&mut self, mark: HighWaterMark) {
            self.marks.push(mark);
        }
    }

    type TestViewer = Viewer<FakeFlame, FakeChart, HistoryStack>;

    fn viewer_with(history: HistoryStack) -> TestViewer {
        let dataset = Dataset::new(two_thread_tree(), vec!["A".into(), "B".into()]);
        let series = TimeSeries::new(vec![
            MemorySample { timestamp_ms: 0, resident_bytes: 5, heap_bytes: 1 },
            MemorySample { timestamp_ms: 10, resident_bytes: 9, heap_bytes: 2 },
            MemorySample { timestamp_ms: 20, resident_bytes: 3, heap_bytes: 1 },
        ]);
        let session = Session::new(dataset, series, false, "test");
        let mut viewer = Viewer::new(
            session,
            FakeFlame::default(),
            FakeChart::default(),
            history,
            Duration::ZERO,
        );
        viewer.start();
        viewer
    }

    fn displayed_value(viewer: &TestViewer) -> u64 {
        viewer.flame().tree.as_ref().map(|t| t.value).unwrap_or_default()
    }

    #[test]
    fn test_startup_sequence() {
        let viewer = viewer_with(HistoryStack::new(Some("#4".into())));

        assert!(viewer.hide_uninteresting());
        assert_eq!(viewer.chart().ranges, vec![TimeRange::new(0, 20)]);
        assert_eq!(viewer.chart().marks[0].resident_bytes, 9);
        assert_eq!(viewer.current_id(), 4);
        assert_eq!(viewer.flame().zoom, 4);
        assert!(viewer.session().thread_choices().is_some());
    }

    #[test]
    fn test_thread_selection_end_to_end() {
        let mut viewer = viewer_with(HistoryStack::default());
        assert_eq!(displayed_value(&viewer), 100);

        viewer.on_filter_thread("A");
        assert_eq!(displayed_value(&viewer), 60);
        assert_eq!(viewer.selected_thread(), Some("A"));

        viewer.on_filter_thread(ALL_THREADS);
        assert_eq!(displayed_value(&viewer), 100);
        assert!(!viewer.pipeline().is_active(FilterKind::Thread));
    }

    #[test]
    fn test_every_apply_refreshes() {
        let mut viewer = viewer_with(HistoryStack::default());
        let before = viewer.flame().refreshes;

        viewer.on_filter_thread("nobody");
        assert_eq!(viewer.flame().refreshes, before + 1);
        assert!(viewer.flame().tree.as_ref().unwrap().children.is_empty());
    }

    #[test]
    fn test_programmatic_relayout_is_suppressed() {
        let mut viewer = viewer_with(HistoryStack::default());
        let now = Instant::now();

        // Echo of the startup annotation
        assert!(!viewer.on_relayout(&RelayoutEvent::range("0", "20"), now));
        assert!(viewer.on_relayout(&RelayoutEvent::range("0", "10"), now));
        let request = viewer.poll_refresh(now).unwrap();
        assert_eq!(request.range, TimeRange::new(0, 10));
        assert!(viewer.is_loading());
    }

    #[test]
    fn test_refresh_success_replaces_tree() {
        let mut viewer = viewer_with(HistoryStack::default());
        let now = Instant::now();
        viewer.on_relayout(&RelayoutEvent::range("0", "20"), now);
        viewer.on_relayout(&RelayoutEvent::range("10", "20"), now);
        let request = viewer.poll_refresh(now).unwrap();

        let mut root = CallTree::root();
        root.value = 7;
        viewer.on_refresh_response(RefreshResponse {
            seq: request.seq,
            range: request.range,
            result: Ok(Dataset::new(root, Vec::new())),
        });

        assert!(!viewer.is_loading());
        assert_eq!(displayed_value(&viewer), 7);
        assert_eq!(viewer.chart().ranges.last(), Some(&TimeRange::new(10, 20)));
        assert_eq!(
            viewer.chart().marks.last(),
            Some(&HighWaterMark { timestamp_ms: 10, resident_bytes: 9 })
        );
        assert!(viewer.session().thread_choices().is_none());
    }

    #[test]
    fn test_stale_and_failed_responses() {
        let mut viewer = viewer_with(HistoryStack::default());
        let now = Instant::now();
        viewer.on_relayout(&RelayoutEvent::range("0", "20"), now);

        viewer.on_relayout(&RelayoutEvent::range("0", "10"), now);
        let first = viewer.poll_refresh(now).unwrap();
        viewer.on_relayout(&RelayoutEvent::range("10", "20"), now);
        let second = viewer.poll_refresh(now).unwrap();

        viewer.on_refresh_response(RefreshResponse {
            seq: first.seq,
            range: first.range,
            result: Ok(Dataset::new(CallTree::root(), Vec::new())),
        });
        assert!(viewer.is_loading());
        assert_eq!(displayed_value(&viewer), 100);

        viewer.on_refresh_response(RefreshResponse {
            seq: second.seq,
            range: second.range,
            result: Err(Error::InvalidArgument("boom".into())),
        });
        assert!(!viewer.is_loading());
        assert_eq!(displayed_value(&viewer), 100);
        assert!(viewer.last_error().is_some_and(|e| e.contains("boom")));
    }

    #[test]
    fn test_failed_dispatch_clears_loading() {
        let mut viewer = viewer_with(HistoryStack::default());
        let now = Instant::now();
        viewer.on_relayout(&RelayoutEvent::range("0", "20"), now);
        viewer.on_relayout(&RelayoutEvent::range("0", "10"), now);
        let request = viewer.poll_refresh(now).unwrap();
        assert!(viewer.is_loading());

        let spawn_error = std::io::Error::other("no threads left");
        viewer.on_dispatch_failed(request, Error::Io(spawn_error));

        assert!(!viewer.is_loading());
        assert_eq!(displayed_value(&viewer), 100);
        assert!(viewer.last_error().is_some_and(|e| e.contains("no threads left")));
    }

    #[test]
    fn test_zoom_and_history() {
        let mut viewer = viewer_with(HistoryStack::default());
        viewer.on_node_click(1);
        viewer.on_node_click(2);
        assert!(viewer.reset_enabled());

        viewer.history_mut().back();
        viewer.on_pop_state();
        assert_eq!(viewer.current_id(), 1);

        viewer.on_reset_zoom();
        assert_eq!(viewer.current_id(), 0);
        assert!(!viewer.reset_enabled());

        // Unknown ids are ignored
        viewer.on_node_click(999);
        assert_eq!(viewer.current_id(), 0);
    }

    #[test]
    fn test_filtered_out_zoom_returns_to_root() {
        let mut viewer = viewer_with(HistoryStack::default());
        viewer.on_node_click(5);
        assert_eq!(viewer.flame().zoom, 5);

        viewer.on_filter_thread("A");
        assert_eq!(viewer.flame().zoom, 0);
        assert_eq!(viewer.current_id(), 0);
        assert!(!viewer.reset_enabled());

        viewer.on_filter_thread(ALL_THREADS);
        viewer.on_node_click(5);
        assert_eq!(viewer.flame().zoom, 5);
        assert_eq!(viewer.current_id(), 5);
    }

    #[test]
    fn test_refresh_drops_zoom() {
        let mut viewer = viewer_with(HistoryStack::default());
        viewer.on_node_click(2);
        let now = Instant::now();
        viewer.on_relayout(&RelayoutEvent::range("0", "20"), now);
        viewer.on_relayout(&RelayoutEvent::range("0", "10"), now);
        let request = viewer.poll_refresh(now).unwrap();

        let mut root = CallTree::root();
        root.children = vec![
            CallTree::new("x", None),
            CallTree::new("y", None),
            CallTree::new("unrelated", None),
        ];
        root.assign_ids();
        viewer.on_refresh_response(RefreshResponse {
            seq: request.seq,
            range: request.range,
            result: Ok(Dataset::new(root, Vec::new())),
        });

        assert_eq!(viewer.flame().zoom, 0);
        assert_eq!(viewer.current_id(), 0);
        assert_eq!(viewer.history().fragment().as_deref(), Some("#0"));
    }

    #[test]
    fn test_search_and_resize_reach_widget() {
        let mut viewer = viewer_with(HistoryStack::default());
        let refreshes = viewer.flame().refreshes;

        viewer.on_search("a1");
        viewer.on_resize(120);

        assert_eq!(viewer.flame().search, "a1");
        assert_eq!(viewer.flame().width, 120);
        assert_eq!(viewer.flame().refreshes, refreshes + 1);
    }
}
