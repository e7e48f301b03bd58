//! Claim schemas for visas and passports.
//!
//! Both token kinds share the registered claims (`iss`, `sub`, `iat`, `exp`,
//! `jti`) and differ only in their payload, so the body is modelled as
//! [`TokenClaims<P>`] with the payload flattened beside the registered claims.
//! [`SignedToken`] is the tagged sum over the two verified variants.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const CONTROLLED_ACCESS_GRANTS: &str = "ControlledAccessGrants";
pub const DAC_ASSERTION: &str = "dac";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims<P> {
    pub iss: String,
    pub sub: String,
    #[serde(deserialize_with = "numeric_date::deserialize")]
    pub iat: i64,
    #[serde(deserialize_with = "numeric_date::deserialize")]
    pub exp: i64,
    pub jti: String,
    #[serde(flatten)]
    pub payload: P,
}

/// The `ga4gh_visa_v1` object carried by every visa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ga4ghVisa {
    #[serde(rename = "type")]
    pub kind: String,
    pub asserted: i64,
    pub value: String,
    pub source: String,
    pub by: String,
}

impl Ga4ghVisa {
    pub fn controlled_access(
        value: impl Into<String>,
        source: impl Into<String>,
        asserted: i64,
    ) -> Self {
        Self {
            kind: CONTROLLED_ACCESS_GRANTS.to_string(),
            asserted,
            value: value.into(),
            source: source.into(),
            by: DAC_ASSERTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisaPayload {
    pub ga4gh_visa_v1: Ga4ghVisa,
}

/// Passport payload. Visas are embedded as their compact encodings, untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PassportPayload {
    #[serde(default)]
    pub aud: Vec<String>,
    #[serde(default)]
    pub ga4gh_passport_v1: Vec<String>,
}

pub type VisaClaims = TokenClaims<VisaPayload>;
pub type PassportClaims = TokenClaims<PassportPayload>;

/// Claims of an identity-provider token. Only the subject is consumed; any
/// other claims the provider adds are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectClaims {
    pub sub: String,
    #[serde(deserialize_with = "numeric_date::deserialize")]
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,
}

/// A verified token, tagged by the `typ` it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedToken {
    Passport(PassportClaims),
    Visa(VisaClaims),
}

impl SignedToken {
    pub fn subject(&self) -> &str {
        match self {
            Self::Passport(claims) => &claims.sub,
            Self::Visa(claims) => &claims.sub,
        }
    }

    pub fn issuer(&self) -> &str {
        match self {
            Self::Passport(claims) => &claims.iss,
            Self::Visa(claims) => &claims.iss,
        }
    }
}

pub fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}

pub fn new_jti() -> String {
    Uuid::new_v4().to_string()
}

/// NumericDate claims (`exp`, `iat`) as whole seconds. Some providers emit
/// fractional seconds; those are truncated toward zero.
pub(crate) mod numeric_date {
    use serde::Deserializer;
    use serde::de::{self, Visitor};
    use std::fmt;

    struct Seconds;

    impl<'de> Visitor<'de> for Seconds {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a NumericDate in seconds")
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
            i64::try_from(value).map_err(|_| E::custom("NumericDate out of range"))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<i64, E> {
            if value.is_finite() && value.abs() < i64::MAX as f64 {
                Ok(value.trunc() as i64)
            } else {
                Err(E::custom("NumericDate out of range"))
            }
        }
    }

    struct MaybeSeconds;

    impl<'de> Visitor<'de> for MaybeSeconds {
        type Value = Option<i64>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a NumericDate in seconds or null")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
            deserialize(deserializer).map(Some)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        deserializer.deserialize_any(Seconds)
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        deserializer.deserialize_option(MaybeSeconds)
    }
}
