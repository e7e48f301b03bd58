//! Authorized group membership, loaded once at startup.
//!
//! # Purpose
//! Membership in a named group is the only predicate the issuer uses to decide
//! whether an identity receives a visa. The set is read from an external group
//! directory (or a local file) before the listener is bound and is never
//! written afterwards.
//!
//! # Document format
//! A JSON object. Every member whose value is an array of strings is a group;
//! anything else (a group's own address, counters, nested objects) is ignored.
//!
//! ```json
//! {"email": "amp-pd@example.org", "adminsEmails": ["a@x"], "membersEmails": []}
//! ```
use passport_authz::{AuthzError, AuthzResult};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const GROUP_DIRECTORY_TARGET: &str = "group directory";

#[derive(Debug, Clone, Default)]
pub struct AuthorizedGroupSet {
    groups: HashMap<String, HashSet<String>>,
}

impl AuthorizedGroupSet {
    pub fn from_document(document: &serde_json::Map<String, Value>) -> Self {
        let groups = document
            .iter()
            .filter_map(|(name, value)| {
                let members = value.as_array()?;
                let members = members
                    .iter()
                    .filter_map(|member| member.as_str().map(str::to_string))
                    .collect();
                Some((name.clone(), members))
            })
            .collect();
        Self { groups }
    }

    pub fn from_groups<I, G, M>(groups: I) -> Self
    where
        I: IntoIterator<Item = (G, Vec<M>)>,
        G: Into<String>,
        M: Into<String>,
    {
        Self {
            groups: groups
                .into_iter()
                .map(|(name, members)| {
                    (name.into(), members.into_iter().map(Into::into).collect())
                })
                .collect(),
        }
    }

    /// Fetches the document from the group directory.
    ///
    /// # Errors
    /// - [`AuthzError::UpstreamUnavailable`] on transport failure, non-2xx, or
    ///   a body that is not a JSON object.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> AuthzResult<Self> {
        let response = client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| AuthzError::upstream(GROUP_DIRECTORY_TARGET, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthzError::upstream_status(
                GROUP_DIRECTORY_TARGET,
                status.as_u16(),
                format!("GET {url} returned {status}"),
            ));
        }
        let document: serde_json::Map<String, Value> = response
            .json()
            .await
            .map_err(|err| AuthzError::upstream(GROUP_DIRECTORY_TARGET, err))?;
        Ok(Self::from_document(&document))
    }

    /// Reads the document from a JSON or YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read group file {}", path.display()))?;
        let document: serde_json::Map<String, Value> = serde_yaml::from_str(&contents)
            .with_context(|| format!("parse group file {}", path.display()))?;
        Ok(Self::from_document(&document))
    }

    pub fn contains(&self, group: &str, identity: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.contains(identity))
    }

    /// True if `identity` belongs to at least one of `groups`.
    pub fn contains_any(&self, groups: &[String], identity: &str) -> bool {
        groups.iter().any(|group| self.contains(group, identity))
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn member_count(&self) -> usize {
        self.groups.values().map(HashSet::len).sum()
    }
}
