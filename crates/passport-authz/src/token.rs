//! Compact token encoding and verification.
//!
//! # Key invariants
//! - Every token in the chain is RS256; headers naming any other algorithm
//!   are rejected as malformed.
//! - Expiry is checked before the signature, so a stale token reports
//!   [`AuthzError::Expired`] whether or not it was signed correctly.
//! - [`TokenCodec::decode_header`] and [`TokenCodec::decode_unverified`] never
//!   authenticate anything. Their output only selects which key to fetch or
//!   which directory entry to look up.
//!
//! # Wire format
//! `base64url(header).base64url(claims).base64url(signature)` without padding,
//! produced and consumed by `jsonwebtoken` so externally issued identity
//! tokens interoperate with the passports and visas minted here.

use crate::claims::{PassportClaims, SignedToken, VisaClaims, now_epoch_seconds};
use crate::{AuthzError, AuthzResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;

pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Passport,
    Visa,
}

impl TokenType {
    pub const PASSPORT_TYP: &'static str = "urn:ga4gh:params:oauth:token-type:passport";
    pub const VISA_TYP: &'static str = "vnd.ga4gh.visa+jwt";

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passport => Self::PASSPORT_TYP,
            Self::Visa => Self::VISA_TYP,
        }
    }

    pub fn from_typ(typ: &str) -> Option<Self> {
        match typ {
            Self::PASSPORT_TYP => Some(Self::Passport),
            Self::VISA_TYP => Some(Self::Visa),
            _ => None,
        }
    }
}

/// The header fields consumed across the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: Algorithm,
    pub typ: Option<String>,
    pub kid: Option<String>,
    pub jku: Option<String>,
}

impl TokenHeader {
    pub fn new(token_type: TokenType, kid: impl Into<String>, jku: impl Into<String>) -> Self {
        Self {
            alg: SIGNING_ALGORITHM,
            typ: Some(token_type.as_str().to_string()),
            kid: Some(kid.into()),
            jku: Some(jku.into()),
        }
    }

    pub fn token_type(&self) -> Option<TokenType> {
        self.typ.as_deref().and_then(TokenType::from_typ)
    }

    /// Returns `(jku, kid)` or a malformed-token error naming the missing field.
    pub fn key_location(&self) -> AuthzResult<(&str, &str)> {
        let jku = self
            .jku
            .as_deref()
            .ok_or_else(|| AuthzError::MalformedToken("header has no jku".to_string()))?;
        let kid = self.kid_required()?;
        Ok((jku, kid))
    }

    pub fn kid_required(&self) -> AuthzResult<&str> {
        self.kid
            .as_deref()
            .ok_or_else(|| AuthzError::MalformedToken("header has no kid".to_string()))
    }

    pub(crate) fn to_jwt_header(&self) -> Header {
        let mut header = Header::new(self.alg);
        header.typ = self.typ.clone();
        header.kid = self.kid.clone();
        header.jku = self.jku.clone();
        header
    }
}

impl From<Header> for TokenHeader {
    fn from(header: Header) -> Self {
        Self {
            alg: header.alg,
            typ: header.typ,
            kid: header.kid,
            jku: header.jku,
        }
    }
}

#[derive(Deserialize)]
struct ExpiryProbe {
    #[serde(default, deserialize_with = "crate::claims::numeric_date::deserialize_option")]
    exp: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCodec {
    leeway: u64,
}

impl TokenCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leeway(leeway: u64) -> Self {
        Self { leeway }
    }

    pub fn decode_header(&self, token: &str) -> AuthzResult<TokenHeader> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|err| AuthzError::MalformedToken(format!("unreadable header: {err}")))?;
        Ok(header.into())
    }

    /// Reads the claims segment without checking the signature.
    ///
    /// Only for choosing which lookup to perform before a key is known.
    pub fn decode_unverified<T: DeserializeOwned>(&self, token: &str) -> AuthzResult<T> {
        let mut parts = token.split('.');
        let (Some(_), Some(payload), Some(_), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthzError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ));
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|err| AuthzError::MalformedToken(format!("claims segment: {err}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| AuthzError::MalformedToken(format!("claims json: {err}")))
    }

    /// Full verification: expiry first, then the RS256 signature against `key`.
    pub fn verify<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> AuthzResult<T> {
        let probe: ExpiryProbe = self.decode_unverified(token)?;
        let exp = probe
            .exp
            .ok_or_else(|| AuthzError::MalformedToken("missing exp claim".to_string()))?;
        if exp < now_epoch_seconds() - self.leeway as i64 {
            return Err(AuthzError::Expired);
        }

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = self.leeway;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);
        let data = jsonwebtoken::decode::<T>(token, key, &validation)?;
        Ok(data.claims)
    }

    /// Verifies `token` and tags the claims by the header's `typ`.
    pub fn verify_signed(&self, token: &str, key: &DecodingKey) -> AuthzResult<SignedToken> {
        let header = self.decode_header(token)?;
        match header.token_type() {
            Some(TokenType::Passport) => Ok(SignedToken::Passport(
                self.verify::<PassportClaims>(token, key)?,
            )),
            Some(TokenType::Visa) => Ok(SignedToken::Visa(self.verify::<VisaClaims>(token, key)?)),
            None => Err(AuthzError::MalformedToken(format!(
                "unexpected typ {:?}",
                header.typ
            ))),
        }
    }

    /// Rejects a header whose `typ` is not `expected`.
    pub fn expect_type(&self, header: &TokenHeader, expected: TokenType) -> AuthzResult<()> {
        if header.token_type() == Some(expected) {
            Ok(())
        } else {
            Err(AuthzError::MalformedToken(format!(
                "expected typ {}, found {:?}",
                expected.as_str(),
                header.typ
            )))
        }
    }
}
