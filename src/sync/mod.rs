pub mod reconcile;
pub mod syncer;

use serde::Serialize;

/// How much history a sync pulls from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// One small page of the most recent activities.
    Latest,
    /// Full paginated history within the configured window.
    All,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Latest => "latest",
            SyncMode::All => "all",
        }
    }
}

/// Report returned after syncing one user.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub user: String,
    pub status: SyncStatus,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Provider ids of activities that failed to reconcile.
    pub failed: Vec<String>,
    pub error: Option<String>,
}

impl SyncReport {
    /// Build a report with the status derived from the counts: any failed
    /// record alongside successes is a partial failure, all-failed is failed.
    pub fn from_counts(
        user: String,
        created: u64,
        updated: u64,
        unchanged: u64,
        failed: Vec<String>,
    ) -> Self {
        let status = if failed.is_empty() {
            SyncStatus::Success
        } else if created + updated + unchanged > 0 {
            SyncStatus::PartialFailure
        } else {
            SyncStatus::Failed
        };
        let error = if failed.is_empty() {
            None
        } else {
            Some(format!("failed to reconcile activities: {}", failed.join(", ")))
        };
        Self {
            user,
            status,
            created,
            updated,
            unchanged,
            failed,
            error,
        }
    }

    pub fn total_processed(&self) -> u64 {
        self.created + self.updated + self.unchanged
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    PartialFailure,
    Failed,
}
