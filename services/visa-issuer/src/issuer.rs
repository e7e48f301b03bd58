use crate::groups::AuthorizedGroupSet;
use passport_authz::{
    AuthzResult, Ga4ghVisa, KeyManager, TokenType, VisaClaims, VisaPayload, new_jti,
    now_epoch_seconds,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One access tier: members of any of `groups` receive a visa carrying `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub name: String,
    pub value: String,
    pub groups: Vec<String>,
}

pub fn default_tiers() -> Vec<TierPolicy> {
    let groups = vec!["adminsEmails".to_string(), "membersEmails".to_string()];
    vec![
        TierPolicy {
            name: "tier1".to_string(),
            value: "https://www.amp-pd.org/tier1".to_string(),
            groups: groups.clone(),
        },
        TierPolicy {
            name: "tier2".to_string(),
            value: "https://www.amp-pd.org/tier2".to_string(),
            groups,
        },
    ]
}

#[derive(Debug, Clone)]
pub struct VisaIssuerSettings {
    /// `iss` of every visa.
    pub issuer: String,
    /// `ga4gh_visa_v1.source`.
    pub source: String,
    pub ttl: Duration,
    pub tiers: Vec<TierPolicy>,
}

pub struct VisaIssuer {
    keys: Arc<KeyManager>,
    settings: VisaIssuerSettings,
}

impl VisaIssuer {
    pub fn new(keys: Arc<KeyManager>, settings: VisaIssuerSettings) -> Self {
        Self { keys, settings }
    }

    pub fn tiers(&self) -> &[TierPolicy] {
        &self.settings.tiers
    }

    /// Signs one visa per tier `identity` is authorized for.
    ///
    /// An identity in no group gets an empty list; that is a normal outcome.
    /// Tier values are emitted as configured and never interpreted here.
    pub fn issue_visas(
        &self,
        identity: &str,
        groups: &AuthorizedGroupSet,
    ) -> AuthzResult<Vec<String>> {
        let header = self.keys.header(TokenType::Visa)?;
        let iat = now_epoch_seconds();
        let exp = iat + self.settings.ttl.as_secs() as i64;

        let mut visas = Vec::new();
        for tier in &self.settings.tiers {
            if !groups.contains_any(&tier.groups, identity) {
                continue;
            }
            let claims = VisaClaims {
                iss: self.settings.issuer.clone(),
                sub: identity.to_string(),
                iat,
                exp,
                jti: new_jti(),
                payload: VisaPayload {
                    ga4gh_visa_v1: Ga4ghVisa::controlled_access(
                        tier.value.clone(),
                        self.settings.source.clone(),
                        iat,
                    ),
                },
            };
            visas.push(self.keys.sign(&header, &claims)?);
            tracing::debug!(tier = %tier.name, "visa signed");
        }
        metrics::counter!("visa_issuer_visas_issued_total").increment(visas.len() as u64);
        Ok(visas)
    }
}
