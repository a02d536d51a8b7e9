//! Client-certificate credentials for the client-credentials grant.
//!
//! Instead of a shared secret the app proves its identity with a short-lived
//! RS256 JWT ("client assertion") signed by the certificate's private key.
//! The identity platform matches the key through the SHA-256 thumbprint in
//! the `x5t#S256` header.

use std::fmt;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use pem::Pem;
use pkcs8::EncryptedPrivateKeyInfo;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::GraphError;

/// Lifetime of a signed assertion.
const ASSERTION_LIFETIME_MINUTES: i64 = 10;

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const PKCS8_TAG: &str = "PRIVATE KEY";
const PKCS1_TAG: &str = "RSA PRIVATE KEY";
const ENCRYPTED_TAG: &str = "ENCRYPTED PRIVATE KEY";

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

/// A loaded certificate: its thumbprint and the key that signs assertions.
#[derive(Clone)]
pub struct ClientCertificate {
    thumbprint: String,
    key: EncodingKey,
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

impl ClientCertificate {
    /// Load a PEM certificate and its RSA private key. Both paths may point
    /// at the same file. `password` decrypts an `ENCRYPTED PRIVATE KEY`
    /// (PKCS#8, PBES2).
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        password: Option<&str>,
    ) -> Result<Self, GraphError> {
        let cert_pem = read_pem(cert_path.as_ref())?;
        let key_pem = if key_path.as_ref() == cert_path.as_ref() {
            cert_pem.clone()
        } else {
            read_pem(key_path.as_ref())?
        };
        Self::from_pem(&cert_pem, &key_pem, password)
    }

    pub fn from_pem(cert_pem: &str, key_pem: &str, password: Option<&str>) -> Result<Self, GraphError> {
        let der = parse_blocks(cert_pem)?
            .into_iter()
            .find(|block| block.tag() == CERTIFICATE_TAG)
            .ok_or_else(|| GraphError::Certificate("no CERTIFICATE block found".into()))?;
        let thumbprint = URL_SAFE_NO_PAD.encode(Sha256::digest(der.contents()));

        let key_block = parse_blocks(key_pem)?
            .into_iter()
            .find(|block| matches!(block.tag(), PKCS8_TAG | PKCS1_TAG | ENCRYPTED_TAG))
            .ok_or_else(|| GraphError::Certificate("no PRIVATE KEY block found".into()))?;
        let key_block = if key_block.tag() == ENCRYPTED_TAG {
            let password = password.ok_or_else(|| {
                GraphError::Certificate("private key is encrypted and no password was given".into())
            })?;
            decrypt_key(&key_block, password)?
        } else {
            key_block
        };
        let key = EncodingKey::from_rsa_pem(pem::encode(&key_block).as_bytes())
            .map_err(|e| GraphError::Certificate(format!("invalid RSA private key: {e}")))?;

        Ok(Self { thumbprint, key })
    }

    /// Base64url SHA-256 of the certificate's DER encoding.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Sign a client assertion for `client_id` addressed to `audience` (the
    /// token endpoint URL).
    pub fn client_assertion(
        &self,
        client_id: &str,
        audience: &str,
        now: DateTime<Utc>,
    ) -> Result<String, GraphError> {
        let issued = now.timestamp();
        let claims = AssertionClaims {
            aud: audience,
            iss: client_id,
            sub: client_id,
            jti: Uuid::new_v4().to_string(),
            nbf: issued,
            iat: issued,
            exp: (now + Duration::minutes(ASSERTION_LIFETIME_MINUTES)).timestamp(),
        };
        let header = Header {
            alg: Algorithm::RS256,
            x5t_s256: Some(self.thumbprint.clone()),
            ..Default::default()
        };
        encode(&header, &claims, &self.key)
            .map_err(|e| GraphError::Certificate(format!("failed to sign client assertion: {e}")))
    }
}

fn read_pem(path: &Path) -> Result<String, GraphError> {
    fs::read_to_string(path)
        .map_err(|e| GraphError::Certificate(format!("cannot read {}: {e}", path.display())))
}

fn parse_blocks(text: &str) -> Result<Vec<Pem>, GraphError> {
    pem::parse_many(text).map_err(|e| GraphError::Certificate(format!("malformed PEM: {e}")))
}

/// Decrypted PKCS#8 key, re-wrapped as an unencrypted `PRIVATE KEY` block.
fn decrypt_key(block: &Pem, password: &str) -> Result<Pem, GraphError> {
    let info = EncryptedPrivateKeyInfo::try_from(block.contents())
        .map_err(|e| GraphError::Certificate(format!("malformed encrypted private key: {e}")))?;
    let document = info
        .decrypt(password)
        .map_err(|e| GraphError::Certificate(format!("cannot decrypt private key: {e}")))?;
    Ok(Pem::new(PKCS8_TAG, document.as_bytes().to_vec()))
}
