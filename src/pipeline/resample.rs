//! Fixed-width time-bucket averaging.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};

use crate::models::SeriesPoint;

// ---

/// Start of the bucket containing `timestamp`.
///
/// Buckets are aligned to the Unix epoch, so boundaries never depend on the
/// data being resampled. For widths that divide a day this matches midnight
/// alignment.
pub fn bucket_start(timestamp: NaiveDateTime, width: Duration) -> NaiveDateTime {
    let secs = timestamp.and_utc().timestamp();
    let step = width.num_seconds().max(1);
    let floored = secs.div_euclid(step) * step;
    timestamp - Duration::seconds(secs - floored)
}

/// Average all points falling into each `width` bucket.
///
/// Output is sorted by bucket start with one point per non-empty bucket.
/// Empty buckets are omitted rather than zero-filled.
pub fn resample_mean(points: &[SeriesPoint], width: Duration) -> Vec<SeriesPoint> {
    // ---
    let mut buckets: BTreeMap<NaiveDateTime, (f64, usize)> = BTreeMap::new();

    for point in points {
        let slot = buckets
            .entry(bucket_start(point.timestamp, width))
            .or_insert((0.0, 0));
        slot.0 += point.value;
        slot.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(timestamp, (sum, count))| SeriesPoint {
            timestamp,
            value: sum / count as f64,
        })
        .collect()
}
