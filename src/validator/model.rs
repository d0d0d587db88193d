// src/validator/model.rs

use serde::Deserialize;

/// Represents a single JSON Web Key (JWK) as defined in RFC 7517.
///
/// Every field defaults so that one odd entry does not fail decoding of the
/// whole set; unusable entries are filtered out afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JsonWebKey {
    #[serde(deserialize_with = "crate::nullable::deserialize")]
    pub kid: String,
    #[serde(deserialize_with = "crate::nullable::deserialize")]
    pub kty: String,
    #[serde(rename = "use", deserialize_with = "crate::nullable::deserialize")]
    pub use_purpose: String,
    pub alg: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
    #[serde(deserialize_with = "crate::nullable::deserialize")]
    pub x5c: Vec<String>,
    pub x5t: Option<String>,
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
#[derive(Debug, Default, Deserialize)]
pub struct JsonWebKeySet {
    #[serde(default, deserialize_with = "crate::nullable::deserialize")]
    pub keys: Vec<JsonWebKey>,
}

/// The key material of a signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// A PEM certificate rebuilt from the first `x5c` entry.
    Certificate(String),
    /// Base64url encoded RSA modulus and exponent.
    RsaComponents { n: String, e: String },
}

/// An RSA signature key that passed the JWKS filter.
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub kid: String,
    pub algorithm: Option<String>,
    pub usage: String,
    pub material: KeyMaterial,
}

impl JsonWebKey {
    /// Converts the entry into a `SigningKey` if it is an RSA key meant for
    /// signatures, has a non-empty `kid`, and carries either a certificate
    /// chain or both RSA components.
    ///
    /// A first `x5c` entry that is not standard base64 is not used.
    pub fn to_signing_key(&self) -> Option<SigningKey> {
        if self.use_purpose != "sig" || self.kty != "RSA" || self.kid.is_empty() {
            return None;
        }

        let material = match (self.x5c.first(), self.n.as_deref(), self.e.as_deref()) {
            (Some(cert), _, _) if is_base64_der(cert) => KeyMaterial::Certificate(cert_to_pem(cert)),
            (_, Some(n), Some(e)) if !n.is_empty() && !e.is_empty() => KeyMaterial::RsaComponents {
                n: n.to_string(),
                e: e.to_string(),
            },
            _ => return None,
        };

        Some(SigningKey {
            kid: self.kid.clone(),
            algorithm: self.alg.clone(),
            usage: self.use_purpose.clone(),
            material,
        })
    }
}

impl JsonWebKeySet {
    /// Returns the entries usable for signature verification.
    pub fn signing_keys(&self) -> Vec<SigningKey> {
        self.keys.iter().filter_map(JsonWebKey::to_signing_key).collect()
    }
}

/// `x5c` entries are standard (not url-safe) base64 of a DER certificate.
fn is_base64_der(cert: &str) -> bool {
    !cert.is_empty()
        && cert
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

/// Wraps a base64 DER certificate from an `x5c` chain into PEM armour,
/// folding the body at 64 characters.
pub fn cert_to_pem(cert: &str) -> String {
    let body = cert
        .as_bytes()
        .chunks(64)
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join("\n");
    format!("-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n", body)
}
