use crate::range::TimeRange;

/// One memory snapshot of the profiled process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub timestamp_ms: i64,
    pub resident_bytes: u64,
    pub heap_bytes: u64,
}

/// Memory usage over the whole capture, ordered by timestamp.
/// Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    samples: Vec<MemorySample>,
}

impl TimeSeries {
    pub fn new(mut samples: Vec<MemorySample>) -> Self {
        samples.sort_by_key(|s| s.timestamp_ms);
        TimeSeries { samples }
    }

    pub fn samples(&self) -> &[MemorySample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Range spanning the first and last sample
    pub fn full_range(&self) -> Option<TimeRange> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        Some(TimeRange::new(first.timestamp_ms, last.timestamp_ms))
    }

    /// Samples whose timestamp lies within `range` (inclusive)
    pub fn within(&self, range: TimeRange) -> impl Iterator<Item = &MemorySample> {
        self.samples.iter().filter(move |s| range.contains(s.timestamp_ms))
    }

    /// (x, y) points for plotting resident size
    pub fn resident_points(&self) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .map(|s| (s.timestamp_ms as f64, s.resident_bytes as f64))
            .collect()
    }

    /// (x, y) points for plotting heap size
    pub fn heap_points(&self) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .map(|s| (s.timestamp_ms as f64, s.heap_bytes as f64))
            .collect()
    }
}
