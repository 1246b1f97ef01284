pub mod client;
pub mod types;

pub use client::StravaClient;
pub use types::{SummaryActivity, TokenResponse};

use thiserror::Error;

/// Provider-imposed maximum page size, used for full-history fetches.
/// https://developers.strava.com/docs/#Pagination
pub const MAX_PER_PAGE: u32 = 200;

/// Page size for cheap incremental syncs: one page, most-recent-first.
pub const LATEST_PER_PAGE: u32 = 5;

#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited by provider (429)")]
    RateLimited,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed provider response: {0}")]
    Decode(String),
}

/// The provider calls the sync engine depends on. `StravaClient` is the real
/// implementation; tests script page responses through a fake.
///
/// The activity time window is part of the implementation's construction,
/// not a per-call parameter.
#[allow(async_fn_in_trait)]
pub trait ActivityProvider {
    /// Fetch one page of activity summaries, most-recent-first.
    async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<SummaryActivity>, Error>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, Error>;
}

/// Fetch every activity in the provider's configured window.
///
/// Pages at the provider maximum starting from page 1 and stops as soon as a
/// page comes back shorter than requested (the provider's last-page
/// convention). Any page error aborts the whole fetch; partial results are
/// never returned.
pub async fn fetch_all<P: ActivityProvider>(
    provider: &P,
    access_token: &str,
) -> Result<Vec<SummaryActivity>, Error> {
    let mut all = Vec::new();
    for page in 1.. {
        let activities = provider
            .list_activities(access_token, page, MAX_PER_PAGE)
            .await?;
        let last_page = (activities.len() as u32) < MAX_PER_PAGE;
        all.extend(activities);
        if last_page {
            break;
        }
    }
    Ok(all)
}

/// Fetch only the most recent activities: a single small page, no pagination.
pub async fn fetch_latest<P: ActivityProvider>(
    provider: &P,
    access_token: &str,
) -> Result<Vec<SummaryActivity>, Error> {
    provider
        .list_activities(access_token, 1, LATEST_PER_PAGE)
        .await
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_fetch_all_stops_on_short_page() {
        let provider = FakeProvider::new(vec![
            Ok(page_of(1, 200)),
            Ok(page_of(201, 200)),
            Ok(page_of(401, 47)),
        ]);

        let all = fetch_all(&provider, "tok").await.unwrap();
        assert_eq!(all.len(), 447);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(
            *provider.calls.lock().unwrap(),
            vec![(1, 200), (2, 200), (3, 200)]
        );
    }

    #[tokio::test]
    async fn test_fetch_all_extra_call_when_pages_full() {
        // Three full pages force a fourth call, which returns empty.
        let provider = FakeProvider::new(vec![
            Ok(page_of(1, 200)),
            Ok(page_of(201, 200)),
            Ok(page_of(401, 200)),
            Ok(Vec::new()),
        ]);

        let all = fetch_all(&provider, "tok").await.unwrap();
        assert_eq!(all.len(), 600);
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn test_fetch_all_aborts_on_page_error() {
        let provider = FakeProvider::new(vec![
            Ok(page_of(1, 200)),
            Err(Error::Transport("connection reset".into())),
        ]);

        let err = fetch_all(&provider, "tok").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_all_single_short_page() {
        let provider = FakeProvider::new(vec![Ok(page_of(1, 3))]);

        let all = fetch_all(&provider, "tok").await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_latest_is_one_small_page() {
        let provider = FakeProvider::new(vec![Ok(page_of(1, 5)), Ok(page_of(6, 5))]);

        let latest = fetch_latest(&provider, "tok").await.unwrap();
        assert_eq!(latest.len(), 5);
        assert_eq!(*provider.calls.lock().unwrap(), vec![(1, 5)]);
    }
}
