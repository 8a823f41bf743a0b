// Resolution of the authenticated user over the HTTP API. The realtime
// core needs the current user's id before it can derive conversation keys
// or tell own messages from the peer's.

use log::debug;
use serde::Deserialize;

use super::RealtimeError;

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: u64,
    #[serde(default)]
    pub username: String,
}

/// `GET {api_base}/api/auth/me` with the session's bearer token.
pub async fn fetch_current_user(api_base: &str, token: &str) -> Result<CurrentUser, RealtimeError> {
    let url = format!("{}/api/auth/me", api_base.trim_end_matches('/'));
    debug!("Resolving identity via {}", url);

    let response = reqwest::Client::new()
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| RealtimeError::Identity(e.to_string()))?;

    if !response.status().is_success() {
        return Err(RealtimeError::Identity(format!(
            "identity endpoint returned {}",
            response.status()
        )));
    }

    response
        .json::<CurrentUser>()
        .await
        .map_err(|e| RealtimeError::Identity(format!("invalid identity payload: {}", e)))
}
