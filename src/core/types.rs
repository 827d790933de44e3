use serde::{Deserialize, Serialize};

/// Overall verdict for a scanned URL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Safe,
    Suspicious,
    Danger,
}

/// Severity attached to a risk factor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Canonical form of a URL, immutable after normalization.
///
/// `host` is the ASCII (IDNA-encoded) hostname, lowercase and free of
/// whitespace; `unicode_host` keeps the display form for mixed-script
/// analysis. The fragment is preserved but never sent to the network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedUrl {
    pub scheme: Scheme,
    pub host: String,
    pub unicode_host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
    pub registered_domain: String,
    pub is_ip_literal: bool,
    pub is_punycode: bool,
    pub has_credentials: bool,
}

impl NormalizedUrl {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Hostname formatted for a URL: IPv6 literals get brackets back.
    pub fn host_for_url(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// Serialized form without the fragment, used for network requests
    /// and as the cache key.
    pub fn request_target(&self) -> String {
        let mut out = format!("{}://{}", self.scheme.as_str(), self.host_for_url());
        if let Some(port) = self.port {
            out.push_str(&format!(":{}", port));
        }
        out.push_str(&self.path);
        if let Some(q) = &self.query {
            out.push('?');
            out.push_str(q);
        }
        out
    }
}

/// Live observations from the DNS / TLS / HTTP probes.
///
/// Every field is optional: absence means that probe step did not
/// complete (timeout, resolution failure, handshake error).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkObservation {
    pub dns_resolved: Option<bool>,
    pub dns_ttl: Option<u32>,
    pub dns_flags: Vec<String>,
    pub ssl_valid: Option<bool>,
    pub ssl_issuer: Option<String>,
    pub ssl_days_until_expiry: Option<i64>,
    pub ssl_is_new_cert: Option<bool>,
    pub http_status: Option<u16>,
    pub redirect_count: u32,
    pub final_url: Option<String>,
    pub content_flags: Vec<String>,
}

/// Ordinal trust classification: trusted < moderate < neutral < unknown
/// < untrusted. The derived `Ord` follows declaration order and must stay
/// aligned with the dampening factors below.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ReputationTier {
    Trusted,
    Moderate,
    Neutral,
    Unknown,
    Untrusted,
}

impl ReputationTier {
    /// Multiplier applied to the raw ML probability. Monotonic over the
    /// tier ordinal.
    pub fn dampening_factor(self) -> f64 {
        match self {
            ReputationTier::Trusted => 0.2,
            ReputationTier::Moderate => 0.5,
            ReputationTier::Neutral => 0.7,
            ReputationTier::Unknown => 0.85,
            ReputationTier::Untrusted => 1.0,
        }
    }
}

/// Trust classification of the registered domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainTrust {
    pub registered_domain: String,
    pub full_domain: String,
    pub reputation_tier: ReputationTier,
    pub dampening_factor: f64,
    pub trust_description: Option<String>,
    pub age_days: Option<i64>,
    pub registrar: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Risk,
    Safe,
}

/// Signed per-feature attribution for one prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub shap_value: f64,
    pub feature_value: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlDetails {
    pub ml_score: f64,
    pub xgb_score: f64,
    pub dampened_score: f64,
    pub explanation: Vec<FeatureContribution>,
}

impl MlDetails {
    /// Placeholder emitted when the model is unavailable; the verdict
    /// then rests on heuristic risk factors alone.
    pub fn unavailable() -> Self {
        Self {
            ml_score: 0.0,
            xgb_score: 0.0,
            dampened_score: 0.0,
            explanation: Vec::new(),
        }
    }
}

/// Coded, severity-tagged reason contributing to the verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanDetails {
    pub ml: MlDetails,
    pub domain: DomainTrust,
    pub network: NetworkObservation,
    pub risk_factors: Vec<RiskFactor>,
    pub analysis_time_ms: Option<u64>,
}

/// Final verdict returned to callers; serializes to the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub status: ScanStatus,
    pub message: String,
    pub risk_score: f64,
    pub details: ScanDetails,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn tier_ordinal_matches_dampening() {
        let ordered = [
            ReputationTier::Trusted,
            ReputationTier::Moderate,
            ReputationTier::Neutral,
            ReputationTier::Unknown,
            ReputationTier::Untrusted,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].dampening_factor() <= pair[1].dampening_factor());
        }
    }

    #[test]
    fn wire_enums_use_lowercase() {
        assert_eq!(
            serde_json::to_string(&ScanStatus::Suspicious).unwrap(),
            "\"suspicious\""
        );
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        assert_eq!(
            serde_json::to_string(&ReputationTier::Untrusted).unwrap(),
            "\"untrusted\""
        );
        assert_eq!(serde_json::to_string(&Direction::Risk).unwrap(), "\"risk\"");
    }

    #[test]
    fn request_target_keeps_query_drops_fragment() {
        let url = NormalizedUrl {
            scheme: Scheme::Https,
            host: "example.com".into(),
            unicode_host: "example.com".into(),
            port: Some(8443),
            path: "/a".into(),
            query: Some("b=1".into()),
            fragment: Some("frag".into()),
            registered_domain: "example.com".into(),
            is_ip_literal: false,
            is_punycode: false,
            has_credentials: false,
        };
        assert_eq!(url.request_target(), "https://example.com:8443/a?b=1");
    }
}
