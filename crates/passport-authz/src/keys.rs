//! In-memory signing keypair for a token-issuing service.
//!
//! # Purpose
//! Each issuing process owns exactly one RSA keypair, generated at startup and
//! never persisted. The public half is published as a key set document at the
//! service's `jku`; the private half signs every token the process emits.
//!
//! # Key invariants
//! - The keypair is generated once. Repeated [`KeyManager::initialize`] calls
//!   are no-ops, so the published key set is byte-identical for the lifetime
//!   of the process.
//! - Signing and publishing before initialization fail with
//!   [`AuthzError::KeyNotInitialized`].
//! - Private key material is never serialized or logged.
//!
//! # Concurrency model
//! Generation is CPU-bound and blocking; services run it on a blocking thread
//! before the listener is bound. After that the keypair is read-only and
//! shared freely across request tasks.

use crate::jwks::{Jwk, Jwks, KeyUse};
use crate::token::{SIGNING_ALGORITHM, TokenHeader, TokenType};
use crate::{AuthzError, AuthzResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::RngCore;
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde::Serialize;
use std::sync::OnceLock;

pub const DEFAULT_MODULUS_BITS: usize = 2048;

#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    pub kid: String,
    /// Absolute URL of this service's published key set.
    pub jku: String,
    pub modulus_bits: usize,
}

impl KeyManagerConfig {
    pub fn new(kid: impl Into<String>, jku: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            jku: jku.into(),
            modulus_bits: DEFAULT_MODULUS_BITS,
        }
    }

    /// Config with a random hex `kid`.
    pub fn with_random_kid(jku: impl Into<String>) -> Self {
        Self::new(random_kid(), jku)
    }
}

struct Keypair {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public: Jwk,
}

pub struct KeyManager {
    config: KeyManagerConfig,
    keypair: OnceLock<Keypair>,
}

impl KeyManager {
    pub fn new(config: KeyManagerConfig) -> Self {
        Self {
            config,
            keypair: OnceLock::new(),
        }
    }

    pub fn kid(&self) -> &str {
        &self.config.kid
    }

    pub fn jku(&self) -> &str {
        &self.config.jku
    }

    pub fn is_initialized(&self) -> bool {
        self.keypair.get().is_some()
    }

    /// Generates the keypair on first call.
    ///
    /// # Errors
    /// - [`AuthzError::KeyGeneration`] if the modulus is below 2048 bits or the
    ///   RSA backend fails. The process must not serve traffic in that case.
    pub fn initialize(&self) -> AuthzResult<()> {
        if self.keypair.get().is_some() {
            return Ok(());
        }
        if self.config.modulus_bits < DEFAULT_MODULUS_BITS {
            return Err(AuthzError::KeyGeneration(format!(
                "modulus of {} bits is below the {DEFAULT_MODULUS_BITS}-bit minimum",
                self.config.modulus_bits
            )));
        }

        let private = RsaPrivateKey::new(&mut rand::thread_rng(), self.config.modulus_bits)
            .map_err(|err| AuthzError::KeyGeneration(err.to_string()))?;
        let der = private
            .to_pkcs1_der()
            .map_err(|err| AuthzError::KeyGeneration(err.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

        let n = URL_SAFE_NO_PAD.encode(private.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(private.e().to_bytes_be());
        let decoding_key = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|err| AuthzError::KeyGeneration(err.to_string()))?;
        let public = Jwk {
            kty: "RSA".to_string(),
            kid: self.config.kid.clone(),
            alg: Some("RS256".to_string()),
            use_field: Some(KeyUse::Sig),
            n,
            e,
        };

        // A concurrent initializer may have won; its keypair stays.
        let _ = self.keypair.set(Keypair {
            encoding_key,
            decoding_key,
            public,
        });
        tracing::info!(kid = %self.config.kid, jku = %self.config.jku, "signing keypair generated");
        Ok(())
    }

    pub fn public_key_set(&self) -> AuthzResult<Jwks> {
        let keypair = self.keypair()?;
        Ok(Jwks {
            keys: vec![keypair.public.clone()],
        })
    }

    /// Verification key for tokens this process signed.
    pub fn decoding_key(&self) -> AuthzResult<DecodingKey> {
        Ok(self.keypair()?.decoding_key.clone())
    }

    /// A header naming this process's `kid` and `jku`.
    pub fn header(&self, token_type: TokenType) -> AuthzResult<TokenHeader> {
        self.keypair()?;
        Ok(TokenHeader::new(
            token_type,
            self.config.kid.clone(),
            self.config.jku.clone(),
        ))
    }

    /// Signs `claims` under `header`.
    ///
    /// # Errors
    /// - [`AuthzError::KeyNotInitialized`] before [`KeyManager::initialize`].
    /// - [`AuthzError::InvalidKey`] when the header names another algorithm or
    ///   another key than the one this process holds.
    pub fn sign<T: Serialize>(&self, header: &TokenHeader, claims: &T) -> AuthzResult<String> {
        let keypair = self.keypair()?;
        if header.alg != SIGNING_ALGORITHM {
            return Err(AuthzError::InvalidKey(format!(
                "cannot sign {:?} with an RS256 key",
                header.alg
            )));
        }
        if let Some(kid) = header.kid.as_deref()
            && kid != self.config.kid
        {
            return Err(AuthzError::InvalidKey(format!(
                "header kid {kid} does not match signing key {}",
                self.config.kid
            )));
        }
        let token = jsonwebtoken::encode(&header.to_jwt_header(), claims, &keypair.encoding_key)?;
        Ok(token)
    }

    fn keypair(&self) -> AuthzResult<&Keypair> {
        self.keypair.get().ok_or(AuthzError::KeyNotInitialized)
    }
}

pub fn random_kid() -> String {
    let mut kid_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut kid_bytes);
    hex::encode(kid_bytes)
}
