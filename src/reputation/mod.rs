use std::{collections::HashMap, fs};

use crate::core::error::HawkError;
use crate::core::types::{DomainTrust, NormalizedUrl, ReputationTier};
use crate::net::whois::WhoisInfo;

const BUNDLED_TABLE: &str = include_str!("../../data/reputation.csv");

/// Static domain-trust table.
///
/// Lookup order: exact full host, then registered domain, then the
/// curated parent-suffix rows (`*.`-prefixed in the CSV), else unknown.
/// Loaded once at startup and shared read-only.
pub struct ReputationTable {
    exact: HashMap<String, (ReputationTier, String)>,
    parents: Vec<(String, ReputationTier, String)>,
}

fn parse_tier(raw: &str) -> Option<ReputationTier> {
    match raw {
        "trusted" => Some(ReputationTier::Trusted),
        "moderate" => Some(ReputationTier::Moderate),
        "neutral" => Some(ReputationTier::Neutral),
        "untrusted" => Some(ReputationTier::Untrusted),
        _ => None,
    }
}

impl ReputationTable {
    pub fn load(path: Option<&str>) -> Result<Self, HawkError> {
        let data = match path {
            Some(p) => fs::read_to_string(p).map_err(|e| HawkError::Config(e.to_string()))?,
            None => BUNDLED_TABLE.to_string(),
        };
        Self::from_csv(&data)
    }

    pub fn bundled() -> Self {
        Self::load(None).expect("bundled reputation table parses")
    }

    pub fn from_csv(data: &str) -> Result<Self, HawkError> {
        let mut exact = HashMap::new();
        let mut parents = Vec::new();

        for (lineno, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut cols = line.splitn(3, ',');
            let domain = cols.next().unwrap_or_default().trim().to_lowercase();
            let tier_raw = cols.next().unwrap_or_default().trim();
            let description = cols.next().unwrap_or_default().trim().to_string();

            let tier = parse_tier(tier_raw).ok_or_else(|| {
                HawkError::Config(format!(
                    "reputation table line {}: unknown tier '{}'",
                    lineno + 1,
                    tier_raw
                ))
            })?;

            if let Some(parent) = domain.strip_prefix("*.") {
                parents.push((parent.to_string(), tier, description));
            } else {
                exact.insert(domain, (tier, description));
            }
        }
        Ok(Self { exact, parents })
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tier_for(&self, host: &str, registered_domain: &str) -> (ReputationTier, Option<String>) {
        if let Some((tier, desc)) = self.exact.get(host) {
            return (*tier, Some(desc.clone()));
        }
        if let Some((tier, desc)) = self.exact.get(registered_domain) {
            return (*tier, Some(desc.clone()));
        }
        for (parent, tier, desc) in &self.parents {
            if host == parent || host.ends_with(&format!(".{}", parent)) {
                return (*tier, Some(desc.clone()));
            }
        }
        (ReputationTier::Unknown, None)
    }

    /// Classify a normalized URL's host, folding in WHOIS metadata when a
    /// lookup ran. A freshly registered domain never stays `unknown`.
    pub fn classify(&self, url: &NormalizedUrl, whois: Option<&WhoisInfo>) -> DomainTrust {
        let (mut tier, description) = self.tier_for(&url.host, &url.registered_domain);

        let age_days = whois.and_then(|w| w.age_days);
        let registrar = whois.and_then(|w| w.registrar.clone());

        if tier == ReputationTier::Unknown {
            if let Some(age) = age_days {
                if age < 30 {
                    tier = ReputationTier::Untrusted;
                }
            }
        }

        DomainTrust {
            registered_domain: url.registered_domain.clone(),
            full_domain: url.host.clone(),
            reputation_tier: tier,
            dampening_factor: tier.dampening_factor(),
            trust_description: description,
            age_days,
            registrar,
        }
    }
}
