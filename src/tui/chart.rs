//! Terminal memory chart state.
//!
//! Every change of the visible window, programmatic or from the keyboard,
//! is reported as a relayout event for the range controller to pick up.

use crate::annotation::HighWaterMark;
use crate::range::{RelayoutEvent, TimeRange};
use crate::render::TimeSeriesChart;

/// Narrowest window the chart zooms to
const MIN_WINDOW_MS: i64 = 10;

pub struct SeriesChart {
    full: Option<TimeRange>,
    visible: Option<TimeRange>,
    mark: Option<HighWaterMark>,
    events: Vec<RelayoutEvent>,
}

impl SeriesChart {
    pub fn new(full: Option<TimeRange>) -> Self {
        SeriesChart {
            full,
            visible: full,
            mark: None,
            events: Vec::new(),
        }
    }

    pub fn visible(&self) -> Option<TimeRange> {
        self.visible
    }

    pub fn full(&self) -> Option<TimeRange> {
        self.full
    }

    pub fn mark(&self) -> Option<HighWaterMark> {
        self.mark
    }

    /// Events accumulated since the last drain
    pub fn drain_events(&mut self) -> Vec<RelayoutEvent> {
        std::mem::take(&mut self.events)
    }

    fn clamp(&self, start: i64, end: i64) -> TimeRange {
        let Some(full) = self.full else {
            return TimeRange::new(start, end);
        };
        let width = (end - start).min(full.duration_ms());
        if start < full.start_ms {
            TimeRange::new(full.start_ms, full.start_ms + width)
        } else if end > full.end_ms {
            TimeRange::new(full.end_ms - width, full.end_ms)
        } else {
            TimeRange::new(start, end)
        }
    }

    fn set_visible(&mut self, range: TimeRange, event: RelayoutEvent) {
        if self.visible == Some(range) {
            return;
        }
        self.visible = Some(range);
        self.events.push(event);
    }

    fn range_event(range: TimeRange) -> RelayoutEvent {
        let (start, end) = range.wire_strings();
        RelayoutEvent::range(start, end)
    }

    pub fn zoom_in(&mut self) {
        let Some(v) = self.visible else { return };
        let quarter = (v.duration_ms() / 4).max(0);
        if v.duration_ms() - 2 * quarter < MIN_WINDOW_MS {
            return;
        }
        let range = TimeRange::new(v.start_ms + quarter, v.end_ms - quarter);
        self.set_visible(range, Self::range_event(range));
    }

    pub fn zoom_out(&mut self) {
        let Some(v) = self.visible else { return };
        let half = (v.duration_ms() / 2).max(MIN_WINDOW_MS / 2);
        let range = self.clamp(v.start_ms - half, v.end_ms + half);
        self.set_visible(range, Self::range_event(range));
    }

    fn pan(&mut self, forward: bool) {
        let Some(v) = self.visible else { return };
        let step = (v.duration_ms() / 4).max(1);
        let offset = if forward { step } else { -step };
        let range = self.clamp(v.start_ms + offset, v.end_ms + offset);
        let (start, end) = range.wire_strings();
        self.set_visible(range, RelayoutEvent::endpoints(start, end));
    }

    pub fn pan_left(&mut self) {
        self.pan(false);
    }

    pub fn pan_right(&mut self) {
        self.pan(true);
    }

    /// Show the whole capture. Autorange carries no explicit range, so it
    /// does not trigger re-aggregation.
    pub fn autorange(&mut self) {
        let Some(full) = self.full else { return };
        if self.visible != Some(full) {
            self.visible = Some(full);
            self.events.push(RelayoutEvent::autorange());
        }
    }
}

impl TimeSeriesChart for SeriesChart {
    fn show_range(&mut self, range: TimeRange) {
        self.visible = Some(range);
        self.events.push(Self::range_event(range));
    }

    fn annotate(&mut self, mark: HighWaterMark) {
        self.mark = Some(mark);
    }
}
