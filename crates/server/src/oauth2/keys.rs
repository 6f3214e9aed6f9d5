//! The server's own signing identity and its JWKS publication.

use crate::crypto::{CryptoError, RsaKeyPair};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum SigningKeyError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("key rejected by JWT library: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("failed to read key file: {0}")]
    Io(#[from] std::io::Error),
}

/// A single public key in JWK form.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct JsonWebKey {
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Jwks {
    pub keys: Vec<JsonWebKey>,
}

/// RSA key pair the server signs its own tokens with. Created once at startup
/// and handed to the issuer and validator.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    jwk: JsonWebKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").field("kid", &self.kid).finish()
    }
}

impl SigningKey {
    /// Generates a fresh RSA-2048 key. CPU bound.
    pub fn generate(kid: impl Into<String>) -> Result<Self, SigningKeyError> {
        Self::from_key_pair(kid.into(), RsaKeyPair::generate()?)
    }

    /// Loads a PKCS#8 PEM private key.
    pub fn from_pem(kid: impl Into<String>, pem: &str) -> Result<Self, SigningKeyError> {
        Self::from_key_pair(kid.into(), RsaKeyPair::from_pkcs8_pem(pem)?)
    }

    pub fn from_file(kid: impl Into<String>, path: &str) -> Result<Self, SigningKeyError> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(kid, &pem)
    }

    fn from_key_pair(kid: String, pair: RsaKeyPair) -> Result<Self, SigningKeyError> {
        let private_pem = pair.private_key_pem()?;
        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())?;
        let jwk = JsonWebKey {
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            alg: "RS256".to_string(),
            kid: kid.clone(),
            n: pair.modulus_b64(),
            e: pair.exponent_b64(),
        };
        let decoding = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?;
        Ok(Self {
            kid,
            encoding,
            decoding,
            jwk,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    /// RS256 header carrying this key's `kid`.
    pub fn header(&self) -> Header {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        header
    }

    pub fn jwk(&self) -> &JsonWebKey {
        &self.jwk
    }

    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.jwk.clone()],
        }
    }
}
