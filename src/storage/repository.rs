use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

// ── Models ─────────────────────────────────────────────────────────

/// A registered user, doubling as the credential record for their provider.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub provider: String,
    pub provider_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub avatar_url: Option<String>,
}

/// A stored workout record. `(provider, provider_id)` is the natural key;
/// `id` is internal identity only and never drives deduplication.
#[derive(Debug, Clone)]
pub struct Activity {
    pub id: i64,
    pub user_id: i64,
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    pub sport_type: String,
    pub start_date: DateTime<Utc>,
    /// Meters.
    pub distance: i64,
    /// Seconds.
    pub moving_time: i64,
    /// Seconds, >= moving_time.
    pub elapsed_time: i64,
}

/// One pre-aggregated (week, user, value) row from the group-by-week queries.
/// Rows arrive sorted by user name then week ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekRow {
    pub week: u32,
    pub user: String,
    pub value: i64,
}

/// One (user, value) row from the leaderboard total queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalRow {
    pub user: String,
    pub value: i64,
}

/// Timestamps are stored as UTC text at second resolution so SQLite's
/// strftime() and lexicographic range filters both work on them.
pub(crate) fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn parse_utc(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

// ── Users / credentials ────────────────────────────────────────────

const USER_COLUMNS: &str =
    "id, name, email, provider, provider_id, access_token, refresh_token, avatar_url";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        provider: row.get(3)?,
        provider_id: row.get(4)?,
        access_token: row.get(5)?,
        refresh_token: row.get(6)?,
        avatar_url: row.get(7)?,
    })
}

/// Insert or update a user keyed by (provider, provider_id), returning the id.
/// An existing row keeps its internal id; profile and tokens are overwritten.
#[allow(clippy::too_many_arguments)]
pub fn upsert_user(
    conn: &Connection,
    name: &str,
    email: Option<&str>,
    provider: &str,
    provider_id: &str,
    access_token: &str,
    refresh_token: &str,
    avatar_url: Option<&str>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO users (name, email, provider, provider_id, access_token, refresh_token, avatar_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(provider, provider_id) DO UPDATE SET
            name=excluded.name,
            email=COALESCE(excluded.email, users.email),
            access_token=excluded.access_token,
            refresh_token=excluded.refresh_token,
            avatar_url=COALESCE(excluded.avatar_url, users.avatar_url),
            updated_at=datetime('now')",
        params![name, email, provider, provider_id, access_token, refresh_token, avatar_url],
    )?;
    conn.query_row(
        "SELECT id FROM users WHERE provider = ?1 AND provider_id = ?2",
        params![provider, provider_id],
        |row| row.get(0),
    )
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        user_from_row,
    )
    .optional()
}

/// Resolve a user identifier: a numeric internal id, or a display name.
pub fn find_user(conn: &Connection, identifier: &str) -> Result<Option<User>, rusqlite::Error> {
    if !identifier.is_empty() && identifier.chars().all(|c| c.is_ascii_digit()) {
        if let Some(user) = get_user(conn, identifier.parse().unwrap_or(-1))? {
            return Ok(Some(user));
        }
    }
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE name = ?1"),
        params![identifier],
        user_from_row,
    )
    .optional()
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY name ASC"))?;
    let rows = stmt.query_map([], user_from_row)?;
    rows.collect()
}

/// Persist a refreshed token pair. The single store write of a token refresh.
pub fn update_user_tokens(
    conn: &Connection,
    user_id: i64,
    access_token: &str,
    refresh_token: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE users SET access_token = ?2, refresh_token = ?3, updated_at = datetime('now')
         WHERE id = ?1",
        params![user_id, access_token, refresh_token],
    )?;
    Ok(())
}

// ── Activities ─────────────────────────────────────────────────────

const ACTIVITY_COLUMNS: &str = "id, user_id, provider, provider_id, name, sport_type, \
     start_date, distance, moving_time, elapsed_time";

fn activity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        provider_id: row.get(3)?,
        name: row.get(4)?,
        sport_type: row.get(5)?,
        start_date: parse_utc(6, row.get(6)?)?,
        distance: row.get(7)?,
        moving_time: row.get(8)?,
        elapsed_time: row.get(9)?,
    })
}

/// Exact natural-key lookup, the sole duplicate check on the sync path.
pub fn find_activity_by_natural_key(
    conn: &Connection,
    provider: &str,
    provider_id: &str,
) -> Result<Option<Activity>, rusqlite::Error> {
    conn.query_row(
        &format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE provider = ?1 AND provider_id = ?2"
        ),
        params![provider, provider_id],
        activity_from_row,
    )
    .optional()
}

pub fn insert_activity(conn: &Connection, a: &Activity) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO activities (user_id, provider, provider_id, name, sport_type,
                                 start_date, distance, moving_time, elapsed_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            a.user_id,
            a.provider,
            a.provider_id,
            a.name,
            a.sport_type,
            format_utc(a.start_date),
            a.distance,
            a.moving_time,
            a.elapsed_time,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Update-in-place by internal id; the natural key columns stay untouched.
pub fn update_activity(conn: &Connection, a: &Activity) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE activities SET
            name = ?2, sport_type = ?3, start_date = ?4,
            distance = ?5, moving_time = ?6, elapsed_time = ?7,
            updated_at = datetime('now')
         WHERE id = ?1",
        params![
            a.id,
            a.name,
            a.sport_type,
            format_utc(a.start_date),
            a.distance,
            a.moving_time,
            a.elapsed_time,
        ],
    )?;
    Ok(())
}

pub fn list_activities_for_user(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<Activity>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE user_id = ?1 ORDER BY start_date ASC"
    ))?;
    let rows = stmt.query_map(params![user_id], activity_from_row)?;
    rows.collect()
}

// ── Weekly aggregation rows ────────────────────────────────────────

/// Week expression matching the provider's numbering: ISO week of the
/// timestamp, except timestamps whose ISO year predates the season map to
/// week 0 (as does the NULL sentinel row of an activity-less user).
const WEEK_EXPR: &str = "COALESCE(
        CASE
            WHEN CAST(strftime('%G', a.start_date) AS INTEGER) < ?1 THEN 0
            ELSE CAST(strftime('%V', a.start_date) AS INTEGER)
        END, 0)";

fn weekly_rows(
    conn: &Connection,
    value_expr: &str,
    year: i32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<WeekRow>, rusqlite::Error> {
    // LEFT JOIN keeps users with no activities: they surface as a single
    // sentinel row at week 0 with value 0.
    let sql = format!(
        "SELECT {WEEK_EXPR} AS week, u.name AS user, {value_expr} AS value
         FROM users u
         LEFT JOIN activities a ON a.user_id = u.id
         WHERE a.sport_type IS NULL
            OR (a.sport_type = 'Run' AND a.start_date >= ?2 AND a.start_date < ?3)
         GROUP BY u.id, week
         ORDER BY u.name ASC, week ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![year, format_utc(start), format_utc(end)], |row| {
        Ok(WeekRow {
            week: row.get::<_, i64>(0)? as u32,
            user: row.get(1)?,
            value: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Per-user per-week distance sums in kilometers, sorted user then week.
pub fn weekly_distance_rows(
    conn: &Connection,
    year: i32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<WeekRow>, rusqlite::Error> {
    weekly_rows(conn, "SUM(COALESCE(a.distance, 0)) / 1000", year, start, end)
}

/// Per-user per-week activity counts, sorted user then week.
pub fn weekly_count_rows(
    conn: &Connection,
    year: i32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<WeekRow>, rusqlite::Error> {
    weekly_rows(conn, "COUNT(a.id)", year, start, end)
}

// ── Leaderboard totals ─────────────────────────────────────────────

fn total_rows(
    conn: &Connection,
    value_expr: &str,
    extra_filter: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<TotalRow>, rusqlite::Error> {
    let sql = format!(
        "SELECT u.name AS user, {value_expr} AS value
         FROM users u
         LEFT JOIN activities a ON a.user_id = u.id
         WHERE a.sport_type IS NULL
            OR (a.sport_type = 'Run' AND a.start_date >= ?1 AND a.start_date < ?2{extra_filter})
         GROUP BY u.id
         ORDER BY value DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![format_utc(start), format_utc(end)], |row| {
        Ok(TotalRow {
            user: row.get(0)?,
            value: row.get(1)?,
        })
    })?;
    rows.collect()
}

/// Total distance per user in kilometers, highest first.
pub fn total_distance_rows(
    conn: &Connection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<TotalRow>, rusqlite::Error> {
    total_rows(conn, "SUM(COALESCE(a.distance, 0)) / 1000", "", start, end)
}

/// Activity count per user, highest first. Activities shorter than five
/// minutes don't count toward the leaderboard.
pub fn activity_count_rows(
    conn: &Connection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<TotalRow>, rusqlite::Error> {
    total_rows(conn, "COUNT(a.id)", " AND a.elapsed_time >= 300", start, end)
}

/// Total elapsed duration per user in seconds, highest first.
pub fn total_duration_rows(
    conn: &Connection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<TotalRow>, rusqlite::Error> {
    total_rows(conn, "SUM(COALESCE(a.elapsed_time, 0))", "", start, end)
}

// ── App config ─────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO app_config (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Sync runs ──────────────────────────────────────────────────────

pub fn insert_sync_run(conn: &Connection, user_id: i64, mode: &str) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_runs (user_id, mode) VALUES (?1, ?2)",
        params![user_id, mode],
    )?;
    Ok(conn.last_insert_rowid())
}

#[allow(clippy::too_many_arguments)]
pub fn finish_sync_run(
    conn: &Connection,
    run_id: i64,
    status: &str,
    created: u64,
    updated: u64,
    unchanged: u64,
    failed: u64,
    error: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sync_runs SET status = ?2, created = ?3, updated = ?4, unchanged = ?5,
            failed = ?6, error = ?7, finished_at = datetime('now')
         WHERE id = ?1",
        params![
            run_id,
            status,
            created as i64,
            updated as i64,
            unchanged as i64,
            failed as i64,
            error
        ],
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDateTime;

    pub fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("migrations/001_initial.sql"))
            .unwrap();
        conn
    }

    pub fn utc(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ")
            .unwrap()
            .and_utc()
    }

    pub fn add_user(conn: &Connection, name: &str) -> i64 {
        upsert_user(
            conn,
            name,
            None,
            "strava",
            &format!("pid-{name}"),
            "access",
            "refresh",
            None,
        )
        .unwrap()
    }

    pub fn add_run(
        conn: &Connection,
        user_id: i64,
        provider_id: &str,
        start: &str,
        distance: i64,
        elapsed: i64,
    ) -> i64 {
        let a = Activity {
            id: 0,
            user_id,
            provider: "strava".into(),
            provider_id: provider_id.into(),
            name: format!("Run {provider_id}"),
            sport_type: "Run".into(),
            start_date: utc(start),
            distance,
            moving_time: elapsed - 60,
            elapsed_time: elapsed,
        };
        insert_activity(conn, &a).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_upsert_user_keeps_internal_id() {
        let conn = test_conn();
        let id = upsert_user(&conn, "ana", None, "strava", "42", "tok-a", "ref-a", None).unwrap();

        let id2 = upsert_user(
            &conn,
            "ana maria",
            Some("ana@example.com"),
            "strava",
            "42",
            "tok-b",
            "ref-b",
            None,
        )
        .unwrap();
        assert_eq!(id, id2);

        let user = get_user(&conn, id).unwrap().unwrap();
        assert_eq!(user.name, "ana maria");
        assert_eq!(user.email.as_deref(), Some("ana@example.com"));
        assert_eq!(user.access_token, "tok-b");
    }

    #[test]
    fn test_find_user_by_id_and_name() {
        let conn = test_conn();
        let id = add_user(&conn, "bruno");

        assert_eq!(find_user(&conn, &id.to_string()).unwrap().unwrap().id, id);
        assert_eq!(find_user(&conn, "bruno").unwrap().unwrap().id, id);
        assert!(find_user(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn test_update_user_tokens() {
        let conn = test_conn();
        let id = add_user(&conn, "carla");

        update_user_tokens(&conn, id, "new-access", "new-refresh").unwrap();
        let user = get_user(&conn, id).unwrap().unwrap();
        assert_eq!(user.access_token, "new-access");
        assert_eq!(user.refresh_token, "new-refresh");
    }

    #[test]
    fn test_natural_key_lookup_and_update_in_place() {
        let conn = test_conn();
        let uid = add_user(&conn, "dinis");
        let row_id = add_run(&conn, uid, "123", "2020-03-02T08:00:00Z", 5000, 1800);

        let mut stored = find_activity_by_natural_key(&conn, "strava", "123")
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, row_id);

        stored.distance = 5200;
        update_activity(&conn, &stored).unwrap();

        let again = find_activity_by_natural_key(&conn, "strava", "123")
            .unwrap()
            .unwrap();
        assert_eq!(again.id, row_id);
        assert_eq!(again.distance, 5200);
    }

    #[test]
    fn test_weekly_rows_sentinel_for_activityless_user() {
        let conn = test_conn();
        add_user(&conn, "empty");
        let uid = add_user(&conn, "runner");
        // 2020-03-02 is a Monday in ISO week 10.
        add_run(&conn, uid, "1", "2020-03-02T08:00:00Z", 10_000, 3600);

        let season = crate::season::Season::new(2020);
        let (start, end) = season.bounds();
        let rows = weekly_distance_rows(&conn, 2020, start, end).unwrap();

        assert_eq!(
            rows,
            vec![
                WeekRow {
                    week: 0,
                    user: "empty".into(),
                    value: 0
                },
                WeekRow {
                    week: 10,
                    user: "runner".into(),
                    value: 10
                },
            ]
        );
    }

    #[test]
    fn test_weekly_rows_prior_isoyear_maps_to_week_zero() {
        let conn = test_conn();
        let uid = add_user(&conn, "early");
        // 2021-01-01 belongs to ISO year 2020 (week 53); within the 2021
        // season it maps to week 0.
        add_run(&conn, uid, "1", "2021-01-01T10:00:00Z", 7000, 2400);

        let season = crate::season::Season::new(2021);
        let (start, end) = season.bounds();
        let rows = weekly_distance_rows(&conn, 2021, start, end).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].week, 0);
        assert_eq!(rows[0].value, 7);
    }

    #[test]
    fn test_weekly_rows_ignore_other_sports_and_window() {
        let conn = test_conn();
        let uid = add_user(&conn, "eva");
        add_run(&conn, uid, "in", "2020-05-04T09:00:00Z", 8000, 3000);
        // Outside the window
        add_run(&conn, uid, "out", "2019-05-06T09:00:00Z", 9000, 3000);
        // Wrong sport
        let ride = Activity {
            id: 0,
            user_id: uid,
            provider: "strava".into(),
            provider_id: "ride".into(),
            name: "Ride".into(),
            sport_type: "Ride".into(),
            start_date: utc("2020-05-05T09:00:00Z"),
            distance: 50_000,
            moving_time: 3600,
            elapsed_time: 3700,
        };
        insert_activity(&conn, &ride).unwrap();

        let season = crate::season::Season::new(2020);
        let (start, end) = season.bounds();
        let rows = weekly_distance_rows(&conn, 2020, start, end).unwrap();
        assert_eq!(rows.len(), 1);
        // 2020-05-04 is a Monday in ISO week 19.
        assert_eq!(rows[0].week, 19);
        assert_eq!(rows[0].value, 8);
    }

    #[test]
    fn test_totals_and_count_threshold() {
        let conn = test_conn();
        let uid = add_user(&conn, "filipa");
        add_run(&conn, uid, "long", "2020-03-02T08:00:00Z", 12_000, 4000);
        // Under the five-minute floor: counts for distance, not for count.
        add_run(&conn, uid, "short", "2020-03-03T08:00:00Z", 1_000, 200);

        let season = crate::season::Season::new(2020);
        let (start, end) = season.bounds();

        let distance = total_distance_rows(&conn, start, end).unwrap();
        assert_eq!(distance[0].value, 13);

        let counts = activity_count_rows(&conn, start, end).unwrap();
        assert_eq!(counts[0].value, 1);

        let durations = total_duration_rows(&conn, start, end).unwrap();
        assert_eq!(durations[0].value, 4200);
    }

    #[test]
    fn test_config_roundtrip() {
        let conn = test_conn();
        assert!(get_config(&conn, "year").unwrap().is_none());
        set_config(&conn, "year", "2020").unwrap();
        set_config(&conn, "year", "2021").unwrap();
        assert_eq!(get_config(&conn, "year").unwrap().as_deref(), Some("2021"));
        assert_eq!(list_config(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_sync_run_lifecycle() {
        let conn = test_conn();
        let uid = add_user(&conn, "gil");
        let run_id = insert_sync_run(&conn, uid, "latest").unwrap();
        finish_sync_run(&conn, run_id, "completed", 3, 1, 2, 0, None).unwrap();

        let status: String = conn
            .query_row(
                "SELECT status FROM sync_runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "completed");
    }
}
