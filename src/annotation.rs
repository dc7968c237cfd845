use crate::range::TimeRange;
use crate::render::TimeSeriesChart;
use crate::series::TimeSeries;

/// Label drawn next to the peak marker
pub const HIGH_WATER_MARK_LABEL: &str = "High water mark";

/// Peak resident size inside a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighWaterMark {
    pub timestamp_ms: i64,
    pub resident_bytes: u64,
}

/// Largest resident sample within `range` (inclusive). Ties go to the
/// earliest sample.
pub fn high_water_mark(series: &TimeSeries, range: TimeRange) -> Option<HighWaterMark> {
    series
        .within(range)
        .fold(None, |best: Option<HighWaterMark>, sample| match best {
            Some(mark) if mark.resident_bytes >= sample.resident_bytes => Some(mark),
            _ => Some(HighWaterMark {
                timestamp_ms: sample.timestamp_ms,
                resident_bytes: sample.resident_bytes,
            }),
        })
}

/// Pan the chart to `range` and mark its peak. A window with no samples
/// leaves the previous marker in place.
pub fn update<C: TimeSeriesChart + ?Sized>(
    chart: &mut C,
    series: &TimeSeries,
    range: TimeRange,
) -> Option<HighWaterMark> {
    chart.show_range(range);
    let mark = high_water_mark(series, range)?;
    log::debug!(
        "High water mark {} bytes at {}",
        mark.resident_bytes,
        mark.timestamp_ms
    );
    chart.annotate(mark);
    Some(mark)
}
