use std::{fs, net::IpAddr};

use publicsuffix::{List, Psl};

use crate::core::error::HawkError;

const BUNDLED_PSL: &str = include_str!("../../data/public_suffix_list.dat");

/// Public Suffix List compiled at load time.
///
/// Backs registered-domain (eTLD+1) extraction for the normalizer, the
/// reputation table and the cross-domain redirect rule. The bundled data
/// ships with the crate; `psl_path` swaps in a full upstream copy.
pub struct SuffixList {
    list: List,
}

impl SuffixList {
    pub fn load(path: Option<&str>) -> Result<Self, HawkError> {
        let data = match path {
            Some(p) => fs::read_to_string(p).map_err(|e| HawkError::Config(e.to_string()))?,
            None => BUNDLED_PSL.to_string(),
        };
        let list: List = data
            .parse()
            .map_err(|e| HawkError::Config(format!("public suffix list: {}", e)))?;
        Ok(Self { list })
    }

    pub fn bundled() -> Self {
        Self::load(None).expect("bundled public suffix list parses")
    }

    /// eTLD+1 for a hostname: the longest matching suffix plus one label.
    /// IP literals and hosts without a known parent collapse to the host
    /// itself.
    pub fn registered_domain(&self, host: &str) -> String {
        if host.parse::<IpAddr>().is_ok() {
            return host.to_string();
        }
        let trimmed = host.trim_end_matches('.');
        match self.list.domain(trimmed.as_bytes()) {
            Some(domain) => String::from_utf8_lossy(domain.as_bytes()).to_string(),
            None => trimmed.to_string(),
        }
    }

    /// The effective TLD (public suffix) of a hostname, when one matches.
    pub fn public_suffix(&self, host: &str) -> Option<String> {
        if host.parse::<IpAddr>().is_ok() {
            return None;
        }
        self.list
            .suffix(host.trim_end_matches('.').as_bytes())
            .map(|s| String::from_utf8_lossy(s.as_bytes()).to_string())
    }

    /// Labels left of the registered domain ("docs.google.com" -> 1).
    pub fn subdomain_count(&self, host: &str) -> usize {
        let registered = self.registered_domain(host);
        if registered.len() >= host.len() {
            return 0;
        }
        let prefix = &host[..host.len() - registered.len()];
        prefix.split('.').filter(|l| !l.is_empty()).count()
    }
}
