pub mod weekly;

pub use weekly::SeriesByUser;

use serde::Serialize;

use crate::error::Result;
use crate::season::Season;
use crate::storage::{repository, Database};

/// One chart point. Serializes as `{"x": week, "y": value}` for direct
/// consumption by chart frontends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekPoint {
    #[serde(rename = "x")]
    pub week: u32,
    #[serde(rename = "y")]
    pub value: i64,
}

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub user: String,
    pub value: i64,
}

/// Season totals per user, each list sorted highest first.
#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    /// Kilometers.
    pub distance: Vec<LeaderboardEntry>,
    /// Activities of at least five minutes.
    pub count: Vec<LeaderboardEntry>,
    /// Elapsed seconds.
    pub duration: Vec<LeaderboardEntry>,
}

fn entries(rows: Vec<repository::TotalRow>) -> Vec<LeaderboardEntry> {
    rows.into_iter()
        .map(|r| LeaderboardEntry {
            user: r.user,
            value: r.value,
        })
        .collect()
}

/// Weekly distance per user in kilometers, gap-filled from week 0.
pub async fn weekly_distance(db: &Database, season: Season) -> Result<SeriesByUser> {
    let year = season.year();
    let (start, end) = season.bounds();
    let rows = db
        .reader()
        .call(move |conn| repository::weekly_distance_rows(conn, year, start, end))
        .await?;
    Ok(weekly::gap_fill(&rows))
}

/// Cumulative weekly distance per user, tail-aligned across users.
pub async fn weekly_distance_cumulative(db: &Database, season: Season) -> Result<SeriesByUser> {
    Ok(weekly::cumulative(weekly_distance(db, season).await?))
}

/// Weekly activity count per user, gap-filled from week 0.
pub async fn weekly_count(db: &Database, season: Season) -> Result<SeriesByUser> {
    let year = season.year();
    let (start, end) = season.bounds();
    let rows = db
        .reader()
        .call(move |conn| repository::weekly_count_rows(conn, year, start, end))
        .await?;
    Ok(weekly::gap_fill(&rows))
}

/// Cumulative weekly activity count per user, tail-aligned across users.
pub async fn weekly_count_cumulative(db: &Database, season: Season) -> Result<SeriesByUser> {
    Ok(weekly::cumulative(weekly_count(db, season).await?))
}

/// Season leaderboard: total distance, activity count, and elapsed duration.
pub async fn leaderboard(db: &Database, season: Season) -> Result<Leaderboard> {
    let (start, end) = season.bounds();
    let (distance, count, duration) = db
        .reader()
        .call(move |conn| {
            Ok::<_, rusqlite::Error>((
                repository::total_distance_rows(conn, start, end)?,
                repository::activity_count_rows(conn, start, end)?,
                repository::total_duration_rows(conn, start, end)?,
            ))
        })
        .await?;

    Ok(Leaderboard {
        distance: entries(distance),
        count: entries(count),
        duration: entries(duration),
    })
}

/// Render elapsed seconds the way the dashboard shows them: "1d 07h32m",
/// "07h32m", or "32m", dropping leading units that are zero. Zero is "0".
pub fn format_duration(seconds: i64) -> String {
    if seconds == 0 {
        return "0".to_string();
    }

    let minutes = (seconds % 3600) / 60;
    let hours = (seconds % 86400) / 3600;
    let days = seconds / 86400;

    if days > 0 {
        format!("{days}d {hours:02}h{minutes:02}m")
    } else if hours > 0 {
        format!("{hours:02}h{minutes:02}m")
    } else {
        format!("{minutes:02}m")
    }
}
