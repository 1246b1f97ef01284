use chrono::{DateTime, Datelike, TimeZone, Utc};

/// The single year all provider queries and aggregations are scoped to.
///
/// Resolved once at startup and threaded explicitly through every component
/// that needs a time window; nothing reads the environment at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Season {
    year: i32,
}

impl Season {
    pub fn new(year: i32) -> Self {
        Self { year }
    }

    /// Resolve the season year: explicit override, then the stored config
    /// value, then the current year. Unparseable values fall through.
    pub fn resolve(override_year: Option<i32>, config_value: Option<&str>) -> Self {
        if let Some(year) = override_year {
            return Self::new(year);
        }
        if let Some(v) = config_value {
            if let Ok(year) = v.trim().parse::<i32>() {
                return Self::new(year);
            }
            log::warn!("Ignoring unparseable season year config {v:?}");
        }
        Self::new(Utc::now().year())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Half-open UTC window [Jan 1 of the season, Jan 1 of the next year).
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(self.year, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(self.year + 1, 1, 1, 0, 0, 0).unwrap();
        (start, end)
    }

    /// Window bounds as Unix timestamps, the form the provider API takes.
    pub fn bounds_unix(&self) -> (i64, i64) {
        let (start, end) = self.bounds();
        (start.timestamp(), end.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_cover_exactly_one_year() {
        let season = Season::new(2020);
        let (start, end) = season.bounds();
        assert_eq!(start.to_rfc3339(), "2020-01-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2021-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_resolve_override_wins() {
        let season = Season::resolve(Some(2019), Some("2022"));
        assert_eq!(season.year(), 2019);
    }

    #[test]
    fn test_resolve_config_value() {
        let season = Season::resolve(None, Some(" 2022 "));
        assert_eq!(season.year(), 2022);
    }

    #[test]
    fn test_resolve_bad_config_falls_back_to_current_year() {
        let season = Season::resolve(None, Some("not-a-year"));
        assert_eq!(season.year(), Utc::now().year());
    }

    #[test]
    fn test_bounds_unix_ordered() {
        let (after, before) = Season::new(2024).bounds_unix();
        assert!(after < before);
        // 366 days in 2024
        assert_eq!(before - after, 366 * 86_400);
    }
}
