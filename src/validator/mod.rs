// src/validator/mod.rs

pub mod client;
pub mod model;

use crate::config::{GatekeeperConfig, ValidationDetails};
use crate::error::GatekeeperError;
use client::KeySetResolver;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument};

/// Only RSA PKCS#1 v1.5 signatures are accepted. Anything else in the header
/// is rejected before a key is looked up.
const ALLOWED_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Claims usually present on an access token.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccessTokenClaims {
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub sub: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub iss: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    #[serde(default)]
    pub azp: Option<String>,
    pub exp: u64,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub iat: u64,
    #[serde(default)]
    pub scope: Option<String>,
    /// Read from the configured permissions claim rather than a fixed name.
    #[serde(skip_deserializing)]
    pub permissions: Vec<String>,
}

/// Claims usually present on an ID token.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IdTokenClaims {
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub sub: String,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub iss: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    pub exp: u64,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub iat: u64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub email_verified: bool,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

// `aud` may be a single string or an array of strings.
fn one_or_many<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(d)? {
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
        None => Vec::new(),
    })
}

/// Verifies signed JWTs against the provider's published keys.
///
/// This struct should be created once and reused for all validation
/// requests. It owns the `KeySetResolver` and performs every check on the
/// token: header shape, algorithm family, key lookup by `kid`, signature, and
/// expiry with the configured leeway.
#[derive(Clone)]
pub struct TokenValidator {
    keys: KeySetResolver,
    validation: ValidationDetails,
}

impl TokenValidator {
    /// Creates a new `TokenValidator` with the given configuration.
    pub fn new(config: &GatekeeperConfig, http_client: reqwest::Client) -> Self {
        let keys = KeySetResolver::new(config.jwks_url.clone(), http_client, config.key_cache_ttl);
        Self::with_resolver(keys, config.validation.clone())
    }

    pub fn with_resolver(keys: KeySetResolver, validation: ValidationDetails) -> Self {
        Self { keys, validation }
    }

    /// Validates a token and returns its full claim set.
    #[instrument(skip(self, token), err)]
    pub async fn decode_and_validate(&self, token: &str) -> Result<serde_json::Value, GatekeeperError> {
        // 1. Decode header to get kid and alg without validation.
        let header = decode_header(token).map_err(|e| GatekeeperError::MalformedToken(e.to_string()))?;

        // 2. Reject anything outside the RSA family before touching the key set.
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(GatekeeperError::UnsupportedAlgorithm(header.alg));
        }

        // 3. Resolve the key strictly by kid.
        let kid = header.kid.filter(|k| !k.is_empty()).ok_or(GatekeeperError::MissingKeyId)?;
        let decoding_key = self.keys.get_key(&kid).await?;

        // 4. Construct validation options.
        let mut validation = Validation::new(header.alg);
        validation.leeway = self.validation.leeway.as_secs();
        validation.set_required_spec_claims(&["exp"]);
        match &self.validation.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.validation.issuer {
            validation.set_issuer(&[issuer]);
        }

        // 5. Decode and validate the token.
        let token_data = match decode::<serde_json::Value>(token, &decoding_key, &validation) {
            Ok(data) => data,
            Err(e) => {
                let err = GatekeeperError::from(e);
                if matches!(err, GatekeeperError::InvalidSignature) {
                    // A cached key may be stale after a rotation that reused the kid.
                    self.keys.invalidate(&kid).await;
                }
                return Err(err);
            }
        };

        debug!(kid = %kid, "Token signature and claims validated");
        Ok(token_data.claims)
    }

    /// Validates a token and returns it as an access token claim set.
    pub async fn decode_and_validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, GatekeeperError> {
        let claims = self.decode_and_validate(token).await?;
        access_token_claims(claims, &self.validation.permissions_claim)
    }

    /// Validates a token and returns it as an ID token claim set.
    pub async fn decode_and_validate_id_token(&self, token: &str) -> Result<IdTokenClaims, GatekeeperError> {
        let claims = self.decode_and_validate(token).await?;
        serde_json::from_value(claims).map_err(|e| GatekeeperError::MalformedToken(e.to_string()))
    }
}

fn access_token_claims(claims: serde_json::Value, permissions_claim: &str) -> Result<AccessTokenClaims, GatekeeperError> {
    let permissions: Vec<String> = match claims.get(permissions_claim) {
        Some(value) if !value.is_null() => serde_json::from_value(value.clone())
            .map_err(|e| GatekeeperError::MalformedToken(format!("'{}' claim: {}", permissions_claim, e)))?,
        _ => Vec::new(),
    };

    let mut access: AccessTokenClaims =
        serde_json::from_value(claims).map_err(|e| GatekeeperError::MalformedToken(e.to_string()))?;
    access.permissions = permissions;
    Ok(access)
}
