use chrono::{DateTime, Duration, FixedOffset};

/// Trailing time-based means over a timestamp-sorted series.
///
/// For each index `i` the mean covers every non-null value with timestamp in
/// `(ts[i] - span, ts[i]]`. Uses a two-pointer sweep with running sums, so
/// rows need not be evenly spaced. A point with no contributing value gets
/// `None`.
pub fn trailing_means(
    timestamps: &[DateTime<FixedOffset>],
    values: &[Option<f64>],
    span: Duration,
) -> Vec<Option<f64>> {
    debug_assert_eq!(timestamps.len(), values.len());

    let mut out = Vec::with_capacity(values.len());
    let mut left = 0usize;
    let mut sum = 0.0f64;
    let mut count = 0usize;

    for right in 0..timestamps.len() {
        if let Some(v) = values[right] {
            sum += v;
            count += 1;
        }

        let lower = timestamps[right] - span;
        while left <= right && timestamps[left] <= lower {
            if let Some(v) = values[left] {
                sum -= v;
                count -= 1;
            }
            left += 1;
        }

        if count == 0 {
            // reset so drift from add/remove cycles never leaks forward
            sum = 0.0;
            out.push(None);
        } else {
            out.push(Some(sum / count as f64));
        }
    }

    out
}
