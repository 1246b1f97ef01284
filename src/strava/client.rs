use serde::Deserialize;

use crate::season::Season;
use crate::strava::{ActivityProvider, Error, SummaryActivity, TokenResponse};

const DEFAULT_BASE_URL: &str = "https://www.strava.com/api/v3";
const TOKEN_URL: &str = "https://www.strava.com/oauth/token";

/// Strava API client.
///
/// The activity window is fixed at construction from the configured season;
/// every list call is scoped to that year.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    /// Unix timestamps bounding the season window (after, before).
    window: (i64, i64),
}

impl StravaClient {
    pub fn new(client_id: String, client_secret: String, season: Season) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            client_id,
            client_secret,
            window: season.bounds_unix(),
        }
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, Error> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                log::warn!("Strava rate limit hit (429)");
                return Err(Error::RateLimited);
            }
            if status.as_u16() == 401 {
                return Err(Error::Auth(format!("HTTP 401: {body}")));
            }
            return Err(Error::Transport(format!("HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Decode(e.to_string()))
    }
}

impl ActivityProvider for StravaClient {
    async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<SummaryActivity>, Error> {
        let url = format!("{}/athlete/activities", self.base_url);
        let (after, before) = self.window;

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("after", after.to_string()),
                ("before", before.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        self.check_response_json(response).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("token refresh request failed: {e}")))?;

        self.check_response_json(response).await
    }
}
