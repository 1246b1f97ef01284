//! Pure transforms from sparse per-week aggregation rows to the dense
//! per-user series the dashboard charts want.

use std::collections::BTreeMap;

use crate::stats::WeekPoint;
use crate::storage::repository::WeekRow;

/// Per-user chart series, keyed by display name.
pub type SeriesByUser = BTreeMap<String, Vec<WeekPoint>>;

/// Densify sparse (week, user, value) rows into per-user series.
///
/// Each user's series runs from week 0 up to that user's own last active
/// week, with zero-valued points filling the weeks the rows skipped. Rows
/// must arrive sorted by user then week, which is how the store emits them.
/// Users end at different weeks; no cross-user padding happens here.
pub fn gap_fill(rows: &[WeekRow]) -> SeriesByUser {
    let mut series = SeriesByUser::new();
    let mut week_idx = 0u32;

    for row in rows {
        let points = series.entry(row.user.clone()).or_insert_with(|| {
            week_idx = 0;
            Vec::new()
        });

        while week_idx < row.week {
            points.push(WeekPoint {
                week: week_idx,
                value: 0,
            });
            week_idx += 1;
        }

        points.push(WeekPoint {
            week: row.week,
            value: row.value,
        });
        week_idx += 1;
    }

    series
}

/// Turn each per-week series into a running total, then align the tails:
/// every user whose series ends before the latest active week gets one extra
/// point carrying their final total to that week, so all chart lines reach
/// the same right edge.
pub fn cumulative(mut series: SeriesByUser) -> SeriesByUser {
    let latest_week = series
        .values()
        .filter_map(|points| points.last())
        .map(|p| p.week)
        .max()
        .unwrap_or(0);

    for points in series.values_mut() {
        let mut total = 0;
        for point in points.iter_mut() {
            total += point.value;
            point.value = total;
        }
        if let Some(last) = points.last() {
            if last.week < latest_week {
                points.push(WeekPoint {
                    week: latest_week,
                    value: total,
                });
            }
        }
    }

    series
}
