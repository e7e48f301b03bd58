//! Relying-party verification of passports and the tokens inside them.
//!
//! The outer passport signature covers the visa strings as opaque text. It
//! says nothing about whether those visas are genuine, so [`PassportVerifier`]
//! verifies every embedded visa on its own, through that visa's own `jku` and
//! `kid`, before any grant is reported. Passports and visas are trusted under
//! separate `jku` allow-lists.

use crate::claims::{PassportClaims, VisaClaims};
use crate::resolver::KeyResolver;
use crate::token::{TokenCodec, TokenHeader, TokenType};
use crate::{AuthzError, AuthzResult};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct VerifiedPassport {
    pub claims: PassportClaims,
    pub visas: Vec<VisaClaims>,
}

impl VerifiedPassport {
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    pub fn grants(&self) -> impl Iterator<Item = &str> {
        self.visas
            .iter()
            .map(|visa| visa.payload.ga4gh_visa_v1.value.as_str())
    }

    /// The verified visa granting `value`, or [`AuthzError::Unauthorized`].
    pub fn require_grant(&self, value: &str) -> AuthzResult<&VisaClaims> {
        self.visas
            .iter()
            .find(|visa| visa.payload.ga4gh_visa_v1.value == value)
            .ok_or_else(|| {
                AuthzError::Unauthorized(format!("{} holds no visa for {value}", self.claims.sub))
            })
    }
}

/// Verifies tokens whose key is discovered from their own header.
///
/// Trust is closed by default: a `jku` is only dereferenced when it appears in
/// the matching allow-list, so a verifier built with [`PassportVerifier::new`]
/// alone rejects everything without a single fetch.
#[derive(Clone)]
pub struct PassportVerifier {
    resolver: Arc<dyn KeyResolver>,
    codec: TokenCodec,
    trusted_jku: Vec<String>,
    trusted_visa_jku: Vec<String>,
    issuer: Option<String>,
}

#[derive(Deserialize)]
struct IssuerClaim {
    #[serde(default)]
    iss: Option<String>,
}

impl PassportVerifier {
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            resolver,
            codec: TokenCodec::new(),
            trusted_jku: Vec::new(),
            trusted_visa_jku: Vec::new(),
            issuer: None,
        }
    }

    pub fn with_codec(mut self, codec: TokenCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Key sets accepted for passports and other top-level tokens.
    pub fn with_trusted_jku(mut self, trusted_jku: Vec<String>) -> Self {
        self.trusted_jku = trusted_jku;
        self
    }

    /// Key sets accepted for embedded visas.
    pub fn with_trusted_visa_jku(mut self, trusted_visa_jku: Vec<String>) -> Self {
        self.trusted_visa_jku = trusted_visa_jku;
        self
    }

    /// Requires top-level tokens to carry exactly this `iss`.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Verifies a single token of the `expected` type and returns its claims.
    ///
    /// # Errors
    /// - [`AuthzError::InvalidSignature`] when the `jku` is not allow-listed.
    /// - [`AuthzError::UntrustedIssuer`] when an issuer is configured and the
    ///   signed `iss` differs.
    pub async fn verify_token<T: DeserializeOwned>(
        &self,
        token: &str,
        expected: TokenType,
    ) -> AuthzResult<(TokenHeader, T)> {
        let header = self.codec.decode_header(token)?;
        self.codec.expect_type(&header, expected)?;
        let key = self.resolve_trusted(&header, &self.trusted_jku).await?;
        let claims = self.codec.verify(token, &key)?;
        if let Some(expected_iss) = &self.issuer {
            // Signature already checked, so the unverified read sees the signed bytes.
            let IssuerClaim { iss }: IssuerClaim = self.codec.decode_unverified(token)?;
            if iss.as_deref() != Some(expected_iss.as_str()) {
                tracing::warn!(iss = ?iss, expected = %expected_iss, "rejecting token from unexpected issuer");
                return Err(AuthzError::UntrustedIssuer(iss.unwrap_or_default()));
            }
        }
        Ok((header, claims))
    }

    /// Verifies the passport, then every embedded visa independently.
    ///
    /// # Errors
    /// - Any failure on the passport or on any single visa fails the whole call.
    /// - [`AuthzError::Unauthorized`] when a visa names a different subject.
    pub async fn verify(&self, passport: &str) -> AuthzResult<VerifiedPassport> {
        let (_, claims): (_, PassportClaims) =
            self.verify_token(passport, TokenType::Passport).await?;

        let visas = self
            .verify_visas(&claims.sub, &claims.payload.ga4gh_passport_v1)
            .await?;
        Ok(VerifiedPassport { claims, visas })
    }

    /// Verifies a batch of visas issued to `subject`, each under its own
    /// allow-listed key set. Each distinct `jku`/`kid` pair is resolved once
    /// per call.
    ///
    /// # Errors
    /// - The first visa failure fails the batch; nothing is dropped silently.
    /// - [`AuthzError::Unauthorized`] when a visa names a different subject.
    pub async fn verify_visas(&self, subject: &str, visas: &[String]) -> AuthzResult<Vec<VisaClaims>> {
        let mut keys: HashMap<(String, String), DecodingKey> = HashMap::new();
        let mut verified = Vec::with_capacity(visas.len());
        for (index, visa) in visas.iter().enumerate() {
            let header = self.visa_header(visa)?;
            let (jku, kid) = header.key_location()?;
            let location = (jku.to_string(), kid.to_string());
            let key = match keys.get(&location) {
                Some(key) => key.clone(),
                None => {
                    let key = self.resolve_trusted(&header, &self.trusted_visa_jku).await?;
                    keys.insert(location, key.clone());
                    key
                }
            };
            verified.push(self.verify_visa(index, visa, &key, subject)?);
        }
        Ok(verified)
    }

    /// Verifies a batch that must come from a single signer: the first visa's
    /// allow-listed key verifies every visa, and a visa naming any other
    /// `jku`/`kid` fails the batch.
    ///
    /// # Errors
    /// - [`AuthzError::InvalidSignature`] on a key-location mismatch or a bad
    ///   signature under the pinned key.
    /// - [`AuthzError::Unauthorized`] when a visa names a different subject.
    pub async fn verify_visa_batch(
        &self,
        subject: &str,
        visas: &[String],
    ) -> AuthzResult<Vec<VisaClaims>> {
        let Some(first) = visas.first() else {
            return Ok(Vec::new());
        };
        let pinned_header = self.visa_header(first)?;
        let (pinned_jku, pinned_kid) = pinned_header.key_location()?;
        let key = self
            .resolve_trusted(&pinned_header, &self.trusted_visa_jku)
            .await?;

        let mut verified = Vec::with_capacity(visas.len());
        for (index, visa) in visas.iter().enumerate() {
            let header = self.visa_header(visa)?;
            if header.key_location()? != (pinned_jku, pinned_kid) {
                tracing::warn!(
                    index,
                    jku = ?header.jku,
                    kid = ?header.kid,
                    "visa batch mixes signing keys"
                );
                return Err(AuthzError::InvalidSignature);
            }
            verified.push(self.verify_visa(index, visa, &key, subject)?);
        }
        Ok(verified)
    }

    fn visa_header(&self, visa: &str) -> AuthzResult<TokenHeader> {
        let header = self.codec.decode_header(visa)?;
        self.codec.expect_type(&header, TokenType::Visa)?;
        Ok(header)
    }

    fn verify_visa(
        &self,
        index: usize,
        visa: &str,
        key: &DecodingKey,
        subject: &str,
    ) -> AuthzResult<VisaClaims> {
        let visa_claims: VisaClaims = self.codec.verify(visa, key).map_err(|err| {
            tracing::warn!(index, error = %err, "visa failed verification");
            err
        })?;
        if visa_claims.sub != subject {
            return Err(AuthzError::Unauthorized(format!(
                "visa {index} was issued to a different subject"
            )));
        }
        Ok(visa_claims)
    }

    async fn resolve_trusted(
        &self,
        header: &TokenHeader,
        trusted: &[String],
    ) -> AuthzResult<DecodingKey> {
        let (jku, kid) = header.key_location()?;
        if !trusted.iter().any(|candidate| candidate == jku) {
            tracing::warn!(jku = %jku, "rejecting token signed under an untrusted key set");
            return Err(AuthzError::InvalidSignature);
        }
        self.resolver.resolve(jku, kid).await
    }
}
