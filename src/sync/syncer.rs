use crate::error::{Error, Result};
use crate::storage::repository::{self, User};
use crate::storage::Database;
use crate::strava::{self, ActivityProvider, SummaryActivity};
use crate::sync::reconcile::{reconcile_activity, Outcome};
use crate::sync::{SyncMode, SyncReport, SyncStatus};

/// Refresh a user's provider tokens, returning the user with live credentials.
///
/// The store is written only when the provider actually rotates the access
/// token; an unchanged token means zero writes.
pub async fn refresh_user_tokens<P: ActivityProvider>(
    db: &Database,
    provider: &P,
    user: &User,
) -> Result<User> {
    let response = provider.refresh_token(&user.refresh_token).await?;

    if response.access_token == user.access_token {
        log::debug!("access token for {} still current, skipping write", user.name);
        return Ok(user.clone());
    }

    let mut refreshed = user.clone();
    refreshed.access_token = response.access_token;
    refreshed.refresh_token = response.refresh_token;

    db.writer()
        .call({
            let user_id = refreshed.id;
            let access = refreshed.access_token.clone();
            let refresh = refreshed.refresh_token.clone();
            move |conn| repository::update_user_tokens(conn, user_id, &access, &refresh)
        })
        .await?;

    log::info!("rotated tokens for {}", refreshed.name);
    Ok(refreshed)
}

/// Sync one user: refresh tokens, fetch activities per the mode, and merge
/// each one into the store.
///
/// Refresh and fetch failures abort the whole sync. Per-record merge failures
/// do not: each record is written in its own call, so a bad record costs only
/// itself and shows up in the report's failed list.
pub async fn sync_user<P: ActivityProvider>(
    db: &Database,
    provider: &P,
    user: &User,
    mode: SyncMode,
) -> Result<SyncReport> {
    let run_id = db
        .writer()
        .call({
            let user_id = user.id;
            let mode = mode.as_str();
            move |conn| repository::insert_sync_run(conn, user_id, mode)
        })
        .await?;

    let outcome = sync_user_inner(db, provider, user, mode).await;

    let (status_str, created, updated, unchanged, failed, error) = match &outcome {
        Ok(report) => (
            match report.status {
                SyncStatus::Success => "completed",
                SyncStatus::PartialFailure => "partial_failure",
                SyncStatus::Failed => "failed",
            },
            report.created,
            report.updated,
            report.unchanged,
            report.failed.len() as u64,
            report.error.clone(),
        ),
        Err(e) => ("failed", 0, 0, 0, 0, Some(e.to_string())),
    };

    db.writer()
        .call(move |conn| {
            repository::finish_sync_run(
                conn,
                run_id,
                status_str,
                created,
                updated,
                unchanged,
                failed,
                error.as_deref(),
            )
        })
        .await?;

    outcome
}

async fn sync_user_inner<P: ActivityProvider>(
    db: &Database,
    provider: &P,
    user: &User,
    mode: SyncMode,
) -> Result<SyncReport> {
    let user = refresh_user_tokens(db, provider, user).await.map_err(|e| {
        Error::Sync {
            user: user.name.clone(),
            message: format!("token refresh failed: {e}"),
        }
    })?;

    let activities = match mode {
        SyncMode::All => strava::fetch_all(provider, &user.access_token).await,
        SyncMode::Latest => strava::fetch_latest(provider, &user.access_token).await,
    }
    .map_err(|e| Error::Sync {
        user: user.name.clone(),
        message: format!("activity fetch failed: {e}"),
    })?;

    log::info!(
        "fetched {} activities for {} (mode: {})",
        activities.len(),
        user.name,
        mode.as_str()
    );

    let mut created = 0u64;
    let mut updated = 0u64;
    let mut unchanged = 0u64;
    let mut failed: Vec<String> = Vec::new();

    for activity in &activities {
        let result = db
            .writer()
            .call({
                let user = user.clone();
                let activity: SummaryActivity = activity.clone();
                move |conn| reconcile_activity(conn, &user, &activity)
            })
            .await;

        match result {
            Ok(Outcome::Created) => created += 1,
            Ok(Outcome::Updated) => updated += 1,
            Ok(Outcome::Unchanged) => unchanged += 1,
            Err(e) => {
                log::warn!("failed to merge activity {} for {}: {e}", activity.id, user.name);
                failed.push(activity.id.to_string());
            }
        }
    }

    let report = SyncReport::from_counts(user.name.clone(), created, updated, unchanged, failed);
    log::info!(
        "sync for {} done: {} created, {} updated, {} unchanged, {} failed",
        report.user,
        report.created,
        report.updated,
        report.unchanged,
        report.failed.len()
    );
    Ok(report)
}

/// Sync every registered user in name order. One user's failure never stops
/// the batch; it becomes a failed report in the result.
pub async fn sync_all_users<P: ActivityProvider>(
    db: &Database,
    provider: &P,
    mode: SyncMode,
) -> Result<Vec<SyncReport>> {
    let users = db
        .reader()
        .call(|conn| repository::list_users(conn))
        .await?;

    let mut reports = Vec::with_capacity(users.len());
    for user in &users {
        match sync_user(db, provider, user, mode).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                log::error!("sync failed for {}: {e}", user.name);
                reports.push(SyncReport {
                    user: user.name.clone(),
                    status: SyncStatus::Failed,
                    created: 0,
                    updated: 0,
                    unchanged: 0,
                    failed: Vec::new(),
                    error: Some(e.to_string()),
                });
            }
        }
    }
    Ok(reports)
}
