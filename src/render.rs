//! Seams between the viewer logic and the widgets that draw it.

use crate::annotation::HighWaterMark;
use crate::range::TimeRange;
use crate::tree::{CallTree, NodeId};

/// An icicle/flame widget over a call tree
pub trait FlameGraph {
    /// Replace the displayed tree. Zoom is kept if its node still exists,
    /// otherwise the view falls back to the root.
    fn render(&mut self, tree: CallTree);

    /// Recompute layout after the data or size changed
    fn refresh(&mut self);

    fn find_by_id(&self, id: NodeId) -> Option<&CallTree>;

    fn zoom_to(&mut self, id: NodeId);

    fn reset_zoom(&mut self);

    fn inverted(&self) -> bool;

    fn set_inverted(&mut self, inverted: bool);

    fn set_width(&mut self, width: u16);

    /// Highlight frames whose name or file contains `term`; empty clears
    fn search(&mut self, term: &str);
}

/// The memory-over-time chart
pub trait TimeSeriesChart {
    /// Move the visible x-axis to `range`. Widgets echo this back as a
    /// relayout event.
    fn show_range(&mut self, range: TimeRange);

    /// Mark the peak of the visible window
    fn annotate(&mut self, mark: HighWaterMark);
}
