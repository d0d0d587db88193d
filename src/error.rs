// src/error.rs

use jsonwebtoken::Algorithm;
use thiserror::Error;

/// The primary error type for the `oidc-gatekeeper` library.
#[derive(Debug, Error)]
pub enum GatekeeperError {
    /// The token could not be parsed as a JWT, or its claims do not have the expected shape.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The algorithm in the JWT header is outside the RSA signature family.
    #[error("Unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    /// The JWT header is missing the required 'kid' (Key ID) field.
    #[error("The JWT header is missing the 'kid' (Key ID) field")]
    MissingKeyId,

    /// No usable signing key with the specified 'kid' was published in the JWKS.
    #[error("No signing key found for kid: {0}")]
    UnknownSigningKey(String),

    /// The token signature does not verify against the selected key.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The token `exp` is in the past, even after applying the clock skew leeway.
    #[error("Token has expired")]
    ExpiredToken,

    /// A registered claim (issuer, audience, not-before) failed validation.
    #[error("Invalid token claims: {0}")]
    InvalidClaims(String),

    /// A JWK entry could not be turned into a decoding key.
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// The userinfo endpoint answered with a 4xx status for the presented token.
    #[error("An authorization error occurred while getting the user info from the identity provider. Please make sure that the token is valid.")]
    UserInfoUnauthorized,

    /// An identity provider endpoint answered with a status this layer cannot interpret.
    #[error("Unexpected response from {endpoint}: status code {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    /// Authentication was rejected. The message is deliberately opaque.
    #[error("invalid auth token")]
    InvalidAuthToken,

    /// The requested PKCE code challenge method is not `plain` or `S256`.
    #[error("invalid method: {0}")]
    UnsupportedChallengeMethod(String),

    /// The caller lacks the listed permissions.
    #[error("Missing permissions {}", .0.join(" "))]
    MissingPermissions(Vec<String>),

    /// The token endpoint answered with an OAuth2 error document.
    #[error("{code}: {description}")]
    Provider { code: String, description: String },

    /// The authorization server redirected back with an error instead of a code.
    #[error("Authorization denied: {code}: {description}")]
    AuthorizationDenied { code: String, description: String },

    /// The `state` returned on the login callback does not match the one that was sent.
    #[error("Login callback state does not match the login attempt")]
    LoginStateMismatch,

    /// The login callback carried neither a code nor an error.
    #[error("Login callback is missing the authorization code")]
    MissingAuthorizationCode,

    /// An error occurred during an HTTP request.
    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The login callback listener could not bind or serve.
    #[error("Callback listener error: {0}")]
    Listener(#[from] std::io::Error),

    /// A JSON document could not be decoded.
    #[error("JSON decoding error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl GatekeeperError {
    /// Returns true for errors that mean the presented credentials were not accepted.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            GatekeeperError::MalformedToken(_)
                | GatekeeperError::UnsupportedAlgorithm(_)
                | GatekeeperError::MissingKeyId
                | GatekeeperError::UnknownSigningKey(_)
                | GatekeeperError::InvalidSignature
                | GatekeeperError::ExpiredToken
                | GatekeeperError::InvalidClaims(_)
                | GatekeeperError::UserInfoUnauthorized
                | GatekeeperError::InvalidAuthToken
        )
    }

    /// The permissions whose absence caused a `MissingPermissions` error.
    pub fn missing_permissions(&self) -> &[String] {
        match self {
            GatekeeperError::MissingPermissions(missing) => missing,
            _ => &[],
        }
    }
}

impl From<jsonwebtoken::errors::Error> for GatekeeperError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => GatekeeperError::ExpiredToken,
            ErrorKind::InvalidSignature => GatekeeperError::InvalidSignature,
            ErrorKind::InvalidIssuer => GatekeeperError::InvalidClaims("iss".to_string()),
            ErrorKind::InvalidAudience => GatekeeperError::InvalidClaims("aud".to_string()),
            ErrorKind::InvalidSubject => GatekeeperError::InvalidClaims("sub".to_string()),
            ErrorKind::ImmatureSignature => GatekeeperError::InvalidClaims("nbf".to_string()),
            ErrorKind::MissingRequiredClaim(claim) => GatekeeperError::InvalidClaims(claim.clone()),
            ErrorKind::InvalidAlgorithm => GatekeeperError::InvalidSignature,
            ErrorKind::InvalidRsaKey(msg) => GatekeeperError::InvalidKeyFormat(msg.clone()),
            ErrorKind::InvalidKeyFormat => GatekeeperError::InvalidKeyFormat("unparseable key".to_string()),
            _ => GatekeeperError::MalformedToken(err.to_string()),
        }
    }
}
