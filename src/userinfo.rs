// src/userinfo.rs

use crate::config::GatekeeperConfig;
use crate::error::GatekeeperError;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

/// The address block of a userinfo document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserInfoAddress {
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub country: String,
}

/// The caller's profile as returned by the userinfo endpoint.
///
/// Fetched once per authenticated call and never cached: a successful fetch
/// is the evidence that the token is still live at the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserInfo {
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub sub: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub name: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub given_name: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub family_name: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub middle_name: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub nickname: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub preferred_username: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub profile: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub picture: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub website: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub email: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub email_verified: bool,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub gender: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub birthdate: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub zoneinfo: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub locale: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub phone_number: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub phone_number_verified: bool,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub address: UserInfoAddress,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub updated_at: String,
}

/// Queries the identity provider's userinfo endpoint.
#[derive(Clone)]
pub struct UserInfoClient {
    http_client: reqwest::Client,
    userinfo_url: Url,
}

impl UserInfoClient {
    pub fn new(config: &GatekeeperConfig, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            userinfo_url: config.userinfo_url.clone(),
        }
    }

    /// Fetches the profile for `access_token`. Also works for opaque tokens.
    ///
    /// # Errors
    ///
    /// * `UserInfoUnauthorized` on any 4xx answer.
    /// * `UnexpectedStatus` on any other non-2xx answer.
    /// * `Transport` if the endpoint could not be reached.
    /// * `Decode` if the body is not a userinfo document.
    #[instrument(skip_all, err)]
    pub async fn get_user_info(&self, access_token: &str) -> Result<UserInfo, GatekeeperError> {
        let response = self
            .http_client
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        // Authorization failures come back as plain statuses, not transport errors.
        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            Ok(serde_json::from_slice(&body)?)
        } else if status.is_client_error() {
            Err(GatekeeperError::UserInfoUnauthorized)
        } else {
            Err(GatekeeperError::UnexpectedStatus {
                endpoint: self.userinfo_url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}
