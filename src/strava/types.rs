use serde::{Deserialize, Serialize};

/// Activity summary as returned by the provider's list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryActivity {
    pub id: u64,
    pub name: String,
    pub sport_type: String,
    /// Start time, RFC 3339 in UTC.
    pub start_date: String,
    /// Distance in meters. The provider reports fractional meters.
    pub distance: f64,
    /// Moving time in seconds.
    pub moving_time: i64,
    /// Elapsed time in seconds (>= moving_time).
    pub elapsed_time: i64,
}

/// Response from the provider's token refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}
