// src/retriever.rs

use crate::config::GatekeeperConfig;
use crate::error::GatekeeperError;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
const GRANT_REFRESH_TOKEN: &str = "refresh_token";
const GRANT_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const TOKEN_TYPE_ACCESS_TOKEN: &str = "urn:ietf:params:oauth:token-type:access_token";

/// The tokens returned by a successful grant. Owned by the caller; nothing here keeps a copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub access_token: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub refresh_token: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub id_token: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub token_type: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub expires_in: u64,
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    #[serde(flatten)]
    token: TokenResponse,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Executes OAuth2 grants against the provider's token endpoint.
///
/// All three grants go through one form POST. A response carrying an `error`
/// field becomes `GatekeeperError::Provider`; transport failures are returned
/// unchanged and never retried.
#[derive(Clone)]
pub struct TokenRetriever {
    http_client: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: Option<String>,
}

impl TokenRetriever {
    pub fn new(config: &GatekeeperConfig, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// Exchanges an authorization code and its PKCE verifier for tokens.
    #[instrument(skip(self, access_code, code_verifier), err)]
    pub async fn access_code(
        &self,
        access_code: &str,
        code_verifier: &str,
        redirect_url: &str,
    ) -> Result<TokenResponse, GatekeeperError> {
        let form = [
            ("grant_type", GRANT_AUTHORIZATION_CODE),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", code_verifier),
            ("code", access_code),
            ("redirect_uri", redirect_url),
        ];
        self.token_endpoint_request(&form).await
    }

    /// Requests fresh tokens for a refresh token.
    #[instrument(skip_all, err)]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, GatekeeperError> {
        let form = [
            ("grant_type", GRANT_REFRESH_TOKEN),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_endpoint_request(&form).await
    }

    /// Trades an access token for one usable with `audience` (RFC 8693).
    #[instrument(skip(self, access_token), err)]
    pub async fn token_exchange(
        &self,
        access_token: &str,
        audience: &str,
        scopes: &[&str],
    ) -> Result<TokenResponse, GatekeeperError> {
        let client_secret = self
            .client_secret
            .as_deref()
            .ok_or_else(|| GatekeeperError::MissingConfiguration("client_secret".to_string()))?;
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", GRANT_TOKEN_EXCHANGE),
            ("client_id", self.client_id.as_str()),
            ("subject_token", access_token),
            ("subject_token_type", TOKEN_TYPE_ACCESS_TOKEN),
            ("audience", audience),
            ("client_secret", client_secret),
            ("scope", scope.as_str()),
        ];
        self.token_endpoint_request(&form).await
    }

    async fn token_endpoint_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, GatekeeperError> {
        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(form)
            .send()
            .await?;

        // Providers answer errors with 4xx plus an error document, so the body
        // decides the outcome rather than the status.
        let status = response.status();
        let body = response.bytes().await?;
        let result: TokenEndpointResponse = serde_json::from_slice(&body)?;

        if let Some(code) = result.error.filter(|e| !e.is_empty()) {
            debug!(status = status.as_u16(), error = %code, "Token endpoint returned an error");
            return Err(GatekeeperError::Provider {
                code,
                description: result.error_description.unwrap_or_default(),
            });
        }

        Ok(result.token)
    }
}
