//! Time range selection on the memory chart.
//!
//! Relayout events from the chart are debounced into at most one
//! re-aggregation request per quiet period. Requests carry a sequence
//! number so a slow response for an older range can never overwrite the
//! result for a newer one.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};

/// Default quiet period before a range change triggers a refresh
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const INPUT_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Closed interval of epoch milliseconds. Always `start_ms <= end_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeRange {
    pub fn new(a: i64, b: i64) -> Self {
        TimeRange {
            start_ms: a.min(b),
            end_ms: a.max(b),
        }
    }

    /// Parse both endpoints, accepting them in either order
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(TimeRange::new(parse_timestamp(start)?, parse_timestamp(end)?))
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms <= self.end_ms
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Endpoints in the form sent to a re-aggregation service
    pub fn wire_strings(&self) -> (String, String) {
        (format_timestamp(self.start_ms), format_timestamp(self.end_ms))
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} .. {}",
            format_timestamp(self.start_ms),
            format_timestamp(self.end_ms)
        )
    }
}

/// Parse a chart axis value into epoch milliseconds (UTC).
///
/// Accepts `YYYY-MM-DD HH:MM:SS[.ffffff]`, RFC 3339, or a bare number of
/// milliseconds.
pub fn parse_timestamp(s: &str) -> Result<i64> {
    let s = s.trim();
    for format in INPUT_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(ms) = s.parse::<f64>()
        && ms.is_finite()
    {
        return Ok(ms.round() as i64);
    }
    Err(Error::InvalidTimestamp(s.to_string()))
}

pub fn format_timestamp(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format(WIRE_FORMAT).to_string(),
        None => ms.to_string(),
    }
}

fn value_as_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => parse_timestamp(s).ok(),
        Value::Number(n) => n.as_f64().map(|ms| ms.round() as i64),
        _ => None,
    }
}

/// Payload of a chart relayout notification.
///
/// Zoom and pan report either `xaxis.range[0]` / `xaxis.range[1]` or a
/// two-element `xaxis.range` array. Other keys (autorange, y-axis changes)
/// carry no time range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayoutEvent(pub Map<String, Value>);

impl RelayoutEvent {
    pub fn endpoints(start: impl Into<String>, end: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("xaxis.range[0]".into(), Value::String(start.into()));
        map.insert("xaxis.range[1]".into(), Value::String(end.into()));
        RelayoutEvent(map)
    }

    pub fn range(start: impl Into<String>, end: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(
            "xaxis.range".into(),
            Value::Array(vec![Value::String(start.into()), Value::String(end.into())]),
        );
        RelayoutEvent(map)
    }

    pub fn autorange() -> Self {
        let mut map = Map::new();
        map.insert("xaxis.autorange".into(), Value::Bool(true));
        RelayoutEvent(map)
    }

    /// The selected range, if the event carries a well-formed one
    pub fn time_range(&self) -> Option<TimeRange> {
        if let (Some(start), Some(end)) = (self.0.get("xaxis.range[0]"), self.0.get("xaxis.range[1]"))
        {
            return Some(TimeRange::new(
                value_as_timestamp(start)?,
                value_as_timestamp(end)?,
            ));
        }
        match self.0.get("xaxis.range")? {
            Value::Array(bounds) if bounds.len() == 2 => Some(TimeRange::new(
                value_as_timestamp(&bounds[0])?,
                value_as_timestamp(&bounds[1])?,
            )),
            _ => None,
        }
    }
}

/// Holds the most recent value until `window` has passed without a newer one
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            window,
            pending: None,
        }
    }

    /// Replace any pending value and restart the timer
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((now + self.window, value));
    }

    /// Take the pending value if its quiet period has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if now >= *deadline => self.pending.take().map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// A debounced request to re-aggregate the call tree for `range`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRequest {
    pub seq: u64,
    pub range: TimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Response to the latest request; apply it
    Current,
    /// A newer request has been issued since; discard
    Stale,
}

/// Debounced range selection with self-echo suppression
#[derive(Debug)]
pub struct RangeSelection {
    debouncer: Debouncer<TimeRange>,
    suppressed: u32,
    next_seq: u64,
    latest: Option<u64>,
    loading: bool,
    current: Option<TimeRange>,
}

impl RangeSelection {
    pub fn new(window: Duration) -> Self {
        RangeSelection {
            debouncer: Debouncer::new(window),
            suppressed: 0,
            next_seq: 1,
            latest: None,
            loading: false,
            current: None,
        }
    }

    /// Swallow the next relayout event. Used before programmatic chart
    /// updates so they do not loop back as user range changes.
    pub fn suppress_next(&mut self) {
        self.suppressed += 1;
    }

    /// Feed a relayout notification. Returns whether it was accepted.
    pub fn on_relayout(&mut self, event: &RelayoutEvent, now: Instant) -> bool {
        if self.suppressed > 0 {
            self.suppressed -= 1;
            log::debug!("Ignoring programmatic relayout");
            return false;
        }
        let Some(range) = event.time_range() else {
            log::debug!("Ignoring relayout without a time range: {:?}", event.0);
            return false;
        };
        self.debouncer.push(range, now);
        true
    }

    /// Emit a request once the quiet period has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<RefreshRequest> {
        let range = self.debouncer.poll(now)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.latest = Some(seq);
        self.loading = true;
        log::info!("Requesting re-aggregation #{seq} for {range}");
        Some(RefreshRequest { seq, range })
    }

    /// Settle a request. Only the latest one clears the loading state.
    pub fn complete(&mut self, seq: u64, range: TimeRange) -> Completion {
        if self.latest != Some(seq) {
            log::debug!("Discarding stale response #{seq}");
            return Completion::Stale;
        }
        self.loading = false;
        self.current = Some(range);
        Completion::Current
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Range of the last applied refresh, if any
    pub fn current(&self) -> Option<TimeRange> {
        self.current
    }
}

impl Default for RangeSelection {
    fn default() -> Self {
        RangeSelection::new(DEFAULT_DEBOUNCE)
    }
}
