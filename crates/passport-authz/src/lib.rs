//! Trust-chain primitives shared by the visa issuer and the token exchange.
//!
//! # Purpose
//! Holds everything needed to mint and check GA4GH passports and visas:
//! the in-memory signing keypair, the key set document types, the compact
//! token codec, header-driven remote key discovery, and relying-party
//! passport verification.
//!
//! # How it fits
//! Each issuing service owns one [`KeyManager`] and publishes its key set at
//! `/.well-known/jwks.json`. Verifiers never hold a static trust store; they
//! read `jku` and `kid` from a token header and fetch the key through a
//! [`KeyResolver`].
//!
//! # Key invariants
//! - One algorithm, RS256, across the whole chain.
//! - Passports embed visas as opaque strings. Verifying a passport never
//!   implies its visas are valid; [`PassportVerifier`] checks each one.
//! - Expired tokens are reported as [`AuthzError::Expired`] regardless of
//!   their signature.
//!
//! # Examples
//! ```rust
//! use passport_authz::{KeyManager, KeyManagerConfig, TokenType};
//!
//! let manager = KeyManager::new(KeyManagerConfig::new(
//!     "VISA_KEY",
//!     "http://localhost:7000/.well-known/jwks.json",
//! ));
//! assert!(manager.header(TokenType::Visa).is_err());
//! ```
//!
//! # Common pitfalls
//! - Trusting claims from [`TokenCodec::decode_unverified`] for authorization.
//! - Publishing a `jku` that does not match the URL the key set is served at.

mod claims;
mod errors;
mod jwks;
mod keys;
mod passport;
mod resolver;
mod token;

pub use claims::{
    CONTROLLED_ACCESS_GRANTS, DAC_ASSERTION, Ga4ghVisa, PassportClaims, PassportPayload,
    SignedToken, SubjectClaims, TokenClaims, VisaClaims, VisaPayload, new_jti, now_epoch_seconds,
};
pub use errors::{AuthzError, AuthzResult};
pub use jwks::{Jwk, Jwks, KeyUse};
pub use keys::{DEFAULT_MODULUS_BITS, KeyManager, KeyManagerConfig, random_kid};
pub use passport::{PassportVerifier, VerifiedPassport};
pub use resolver::{
    CachedKeyResolver, DEFAULT_MAX_CACHED_KEY_SETS, KeyResolver, RemoteKeyResolver,
    RequestDecorator, decoding_key_from_jwk, outbound_client,
};
pub use token::{SIGNING_ALGORITHM, TokenCodec, TokenHeader, TokenType};

pub use jsonwebtoken::DecodingKey;
