// src/config.rs

use crate::error::GatekeeperError;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Contains the validation settings applied to access and ID tokens.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ValidationDetails {
    /// The tolerance for clock skew when validating time-based claims like `exp`.
    /// Defaults to 60 seconds.
    #[serde(with = "duration_secs")]
    pub leeway: Duration,
    /// When set, the `iss` claim must equal this value.
    pub issuer: Option<String>,
    /// When set, the `aud` claim must contain this value.
    pub audience: Option<String>,
    /// The claim that carries the caller's permission strings.
    pub permissions_claim: String,
}

impl Default for ValidationDetails {
    fn default() -> Self {
        Self {
            leeway: Duration::from_secs(60),
            issuer: None,
            audience: None,
            permissions_claim: "permissions".to_string(),
        }
    }
}

/// The configuration shared by every component of the gatekeeper.
///
/// It is read-only once built. Components take it (or an `Arc` of it) at
/// construction time, so a running server never observes a change. It should
/// be constructed using the `ConfigBuilder`, or deserialized by the host.
#[derive(Clone, Debug, Deserialize)]
pub struct GatekeeperConfig {
    /// The client ID of the application, as registered with the identity provider.
    pub client_id: String,
    /// The client secret. Only the token exchange grant sends it.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// The OAuth2 token endpoint.
    pub token_url: Url,
    /// The OIDC userinfo endpoint.
    pub userinfo_url: Url,
    /// The JWKS document holding the provider's signing keys.
    pub jwks_url: Url,
    /// The authorization endpoint used by the interactive login flow.
    #[serde(default)]
    pub authorize_url: Option<Url>,
    /// The provider's logout endpoint.
    #[serde(default)]
    pub logout_url: Option<Url>,
    /// Full method names (`/package.Service/Method`) that skip authentication.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// The capability this service guards, used to build `capability:*` permissions.
    pub capability: String,
    #[serde(default)]
    pub validation: ValidationDetails,
    /// How long fetched signing keys stay cached. `None` fetches the JWKS on every lookup.
    #[serde(default, with = "opt_duration_secs")]
    pub key_cache_ttl: Option<Duration>,
    /// Overall request timeout for the shared HTTP client.
    #[serde(default = "default_http_timeout", with = "duration_secs")]
    pub http_timeout: Duration,
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

impl GatekeeperConfig {
    /// Builds the HTTP client every outbound call of this crate goes through.
    pub fn http_client(&self) -> Result<reqwest::Client, GatekeeperError> {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(self.http_timeout)
            .build()
            .map_err(GatekeeperError::from)
    }

    /// Returns true if the given full method name is exempt from authentication.
    pub fn is_whitelisted(&self, full_method: &str) -> bool {
        self.whitelist.iter().any(|m| m == full_method)
    }
}

/// A builder for creating a `GatekeeperConfig` instance.
///
/// This builder provides a fluent API to ensure that the configuration is
/// constructed correctly and with all required fields.
#[derive(Default)]
pub struct ConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    token_url: Option<Url>,
    userinfo_url: Option<Url>,
    jwks_url: Option<Url>,
    authorize_url: Option<Url>,
    logout_url: Option<Url>,
    whitelist: Vec<String>,
    capability: Option<String>,
    key_cache_ttl: Option<Duration>,
    http_timeout: Option<Duration>,
    validation: ValidationDetails,
}

fn parse_url(url: &str) -> Result<Url, GatekeeperError> {
    Url::parse(url).map_err(|e| GatekeeperError::InvalidUrl(e.to_string()))
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client ID of the application. This is a required field.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Sets the token endpoint. This is a required field.
    pub fn token_url(mut self, url: &str) -> Result<Self, GatekeeperError> {
        self.token_url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets the userinfo endpoint. This is a required field.
    pub fn userinfo_url(mut self, url: &str) -> Result<Self, GatekeeperError> {
        self.userinfo_url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets the JWKS endpoint. This is a required field.
    pub fn jwks_url(mut self, url: &str) -> Result<Self, GatekeeperError> {
        self.jwks_url = Some(parse_url(url)?);
        Ok(self)
    }

    pub fn authorize_url(mut self, url: &str) -> Result<Self, GatekeeperError> {
        self.authorize_url = Some(parse_url(url)?);
        Ok(self)
    }

    pub fn logout_url(mut self, url: &str) -> Result<Self, GatekeeperError> {
        self.logout_url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Adds a full method name to the authentication whitelist.
    pub fn whitelist_method(mut self, full_method: impl Into<String>) -> Self {
        self.whitelist.push(full_method.into());
        self
    }

    /// Sets the capability name. This is a required field and must not be empty.
    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    /// Sets the clock skew tolerance. Defaults to 60 seconds.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.validation.leeway = leeway;
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.validation.issuer = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.validation.audience = Some(audience.into());
        self
    }

    /// Sets the claim name permissions are read from. Defaults to `permissions`.
    pub fn permissions_claim(mut self, claim: impl Into<String>) -> Self {
        self.validation.permissions_claim = claim.into();
        self
    }

    /// Enables the signing key cache with the given time-to-live.
    pub fn key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache_ttl = Some(ttl);
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Consumes the builder and returns a `GatekeeperConfig` object.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or the capability is empty.
    pub fn build(self) -> Result<GatekeeperConfig, GatekeeperError> {
        let client_id = self.client_id.ok_or(GatekeeperError::MissingConfiguration("client_id".to_string()))?;
        let token_url = self.token_url.ok_or(GatekeeperError::MissingConfiguration("token_url".to_string()))?;
        let userinfo_url = self.userinfo_url.ok_or(GatekeeperError::MissingConfiguration("userinfo_url".to_string()))?;
        let jwks_url = self.jwks_url.ok_or(GatekeeperError::MissingConfiguration("jwks_url".to_string()))?;
        let capability = self.capability.ok_or(GatekeeperError::MissingConfiguration("capability".to_string()))?;

        if capability.is_empty() {
            return Err(GatekeeperError::InvalidConfiguration("capability cannot be an empty string".to_string()));
        }

        Ok(GatekeeperConfig {
            client_id,
            client_secret: self.client_secret,
            token_url,
            userinfo_url,
            jwks_url,
            authorize_url: self.authorize_url,
            logout_url: self.logout_url,
            whitelist: self.whitelist,
            capability,
            validation: self.validation,
            key_cache_ttl: self.key_cache_ttl,
            http_timeout: self.http_timeout.unwrap_or_else(default_http_timeout),
        })
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
