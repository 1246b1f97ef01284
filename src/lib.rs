pub mod error;
pub mod season;
pub mod stats;
pub mod storage;
pub mod strava;
pub mod sync;

pub use error::{Error, Result};
pub use season::Season;
pub use stats::{Leaderboard, LeaderboardEntry, SeriesByUser, WeekPoint};
pub use storage::Database;
pub use strava::{ActivityProvider, StravaClient};
pub use sync::{SyncMode, SyncReport, SyncStatus};

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::{Activity, User};

use storage::repository;
use sync::syncer;

/// Main entry point: a database plus an activity provider, scoped to one
/// season.
pub struct Runboard<P: ActivityProvider> {
    db: Database,
    provider: P,
    season: Season,
}

impl<P: ActivityProvider> Runboard<P> {
    pub fn new(db: Database, provider: P, season: Season) -> Self {
        Self {
            db,
            provider,
            season,
        }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn season(&self) -> Season {
        self.season
    }

    // ── User commands ──────────────────────────────────────────────

    /// Resolve a user by internal id or name, erroring when absent.
    pub async fn user(&self, identifier: &str) -> Result<User> {
        let identifier = identifier.to_string();
        self.db
            .reader()
            .call({
                let identifier = identifier.clone();
                move |conn| repository::find_user(conn, &identifier)
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("no such user: {identifier}")))
    }

    pub async fn users(&self) -> Result<Vec<User>> {
        self.db
            .reader()
            .call(|conn| repository::list_users(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Register a user (or update an existing one under the same provider
    /// identity). Returns the internal id.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_user(
        &self,
        name: &str,
        email: Option<&str>,
        provider: &str,
        provider_id: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<i64> {
        let name = name.to_string();
        let email = email.map(|s| s.to_string());
        let provider = provider.to_string();
        let provider_id = provider_id.to_string();
        let access_token = access_token.to_string();
        let refresh_token = refresh_token.to_string();
        self.db
            .writer()
            .call(move |conn| {
                repository::upsert_user(
                    conn,
                    &name,
                    email.as_deref(),
                    &provider,
                    &provider_id,
                    &access_token,
                    &refresh_token,
                    None,
                )
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Refresh one user's provider tokens without syncing activities.
    pub async fn refresh_tokens(&self, identifier: &str) -> Result<User> {
        let user = self.user(identifier).await?;
        syncer::refresh_user_tokens(&self.db, &self.provider, &user).await
    }

    // ── Sync commands ──────────────────────────────────────────────

    pub async fn sync_user(&self, identifier: &str, mode: SyncMode) -> Result<SyncReport> {
        let user = self.user(identifier).await?;
        syncer::sync_user(&self.db, &self.provider, &user, mode).await
    }

    pub async fn sync_all(&self, mode: SyncMode) -> Result<Vec<SyncReport>> {
        syncer::sync_all_users(&self.db, &self.provider, mode).await
    }

    // ── Stats commands ─────────────────────────────────────────────

    pub async fn weekly_distance(&self, cumulative: bool) -> Result<SeriesByUser> {
        if cumulative {
            stats::weekly_distance_cumulative(&self.db, self.season).await
        } else {
            stats::weekly_distance(&self.db, self.season).await
        }
    }

    pub async fn weekly_count(&self, cumulative: bool) -> Result<SeriesByUser> {
        if cumulative {
            stats::weekly_count_cumulative(&self.db, self.season).await
        } else {
            stats::weekly_count(&self.db, self.season).await
        }
    }

    pub async fn leaderboard(&self) -> Result<Leaderboard> {
        stats::leaderboard(&self.db, self.season).await
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
