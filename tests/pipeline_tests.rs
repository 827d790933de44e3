use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use urlhawk::config::AppConfig;
use urlhawk::core::psl::SuffixList;
use urlhawk::core::types::{NetworkObservation, NormalizedUrl, ReputationTier, ScanStatus};
use urlhawk::ml::predictor::Predictor;
use urlhawk::net::probe::{Prober, SharedObservation};
use urlhawk::net::whois::{WhoisClient, WhoisInfo};
use urlhawk::pipeline::analyzer::Analyzer;
use urlhawk::HawkError;

/// Prober that replays a scripted observation.
struct StubProber {
    observation: NetworkObservation,
}

#[async_trait]
impl Prober for StubProber {
    async fn probe(&self, _url: &NormalizedUrl, sink: &SharedObservation) {
        *sink.lock().expect("sink poisoned") = self.observation.clone();
    }
}

/// Prober that publishes its observation and then hangs, standing in for
/// a probe whose remaining steps outlive the request deadline.
struct StalledProber {
    observation: NetworkObservation,
}

#[async_trait]
impl Prober for StalledProber {
    async fn probe(&self, _url: &NormalizedUrl, sink: &SharedObservation) {
        *sink.lock().expect("sink poisoned") = self.observation.clone();
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
}

struct StubWhois {
    age_days: Option<i64>,
}

#[async_trait]
impl WhoisClient for StubWhois {
    async fn lookup(&self, _registered_domain: &str) -> Result<WhoisInfo, HawkError> {
        Ok(WhoisInfo {
            age_days: self.age_days,
            registrar: Some("Stub Registrar".to_string()),
            creation_date: None,
        })
    }
}

fn healthy_observation() -> NetworkObservation {
    NetworkObservation {
        dns_resolved: Some(true),
        dns_ttl: Some(300),
        ssl_valid: Some(true),
        ssl_issuer: Some("DigiCert Inc".to_string()),
        ssl_days_until_expiry: Some(120),
        ssl_is_new_cert: Some(false),
        http_status: Some(200),
        redirect_count: 0,
        ..Default::default()
    }
}

fn analyzer(observation: NetworkObservation, whois_age: Option<i64>) -> Analyzer {
    let config = AppConfig {
        cache_enabled: false,
        ..Default::default()
    };
    let whois: Option<Arc<dyn WhoisClient>> = whois_age
        .map(|age| Arc::new(StubWhois { age_days: Some(age) }) as Arc<dyn WhoisClient>);
    Analyzer::new(
        config,
        Arc::new(SuffixList::bundled()),
        Arc::new(urlhawk::reputation::ReputationTable::bundled()),
        Arc::new(Predictor::from_model_path(None)),
        Arc::new(StubProber { observation }),
        whois,
    )
}

fn factor_codes(result: &urlhawk::ScanResult) -> Vec<String> {
    result
        .details
        .risk_factors
        .iter()
        .map(|f| f.code.clone())
        .collect()
}

#[tokio::test]
async fn trusted_domain_with_clean_probe_is_safe() {
    let result = analyzer(healthy_observation(), None)
        .scan("https://example.com/")
        .await
        .unwrap();

    assert_eq!(result.status, ScanStatus::Safe);
    assert!(result.risk_score < 0.3);
    assert!(result
        .details
        .risk_factors
        .iter()
        .all(|f| f.severity != urlhawk::core::types::Severity::Critical));
    assert_eq!(result.details.domain.reputation_tier, ReputationTier::Trusted);
}

#[tokio::test]
async fn ip_literal_with_foreign_login_form_is_danger() {
    let observation = NetworkObservation {
        ssl_valid: None,
        content_flags: vec!["password_field".to_string(), "login_on_nondomain".to_string()],
        ..healthy_observation()
    };
    let result = analyzer(observation, None)
        .scan("http://185.23.14.9/login")
        .await
        .unwrap();

    assert_eq!(result.status, ScanStatus::Danger);
    let codes = factor_codes(&result);
    assert!(codes.contains(&"ip_literal_url".to_string()));
    assert!(codes.contains(&"login_on_nondomain".to_string()));
}

#[tokio::test]
async fn punycode_lookalike_on_young_domain_is_danger() {
    let result = analyzer(healthy_observation(), Some(5))
        .scan("https://xn--pypal-4ve.com/")
        .await
        .unwrap();

    assert_eq!(result.status, ScanStatus::Danger);
    let codes = factor_codes(&result);
    assert!(codes.contains(&"punycode_mixed_script".to_string()));
    assert!(codes.contains(&"new_domain".to_string()));
    assert_eq!(result.details.domain.age_days, Some(5));
    // Unknown + young upgrades to untrusted.
    assert_eq!(
        result.details.domain.reputation_tier,
        ReputationTier::Untrusted
    );
}

#[tokio::test]
async fn shortener_redirect_chain_to_bad_tls_is_danger() {
    let observation = NetworkObservation {
        dns_resolved: Some(true),
        ssl_valid: Some(false),
        http_status: Some(200),
        redirect_count: 6,
        final_url: Some("http://evil.tk/login".to_string()),
        ..Default::default()
    };
    let result = analyzer(observation, None)
        .scan("https://bit.ly/abc")
        .await
        .unwrap();

    assert_eq!(result.status, ScanStatus::Danger);
    let codes = factor_codes(&result);
    assert!(codes.contains(&"many_redirects".to_string()));
    assert!(codes.contains(&"cross_domain_redirect".to_string()));
    assert!(codes.contains(&"invalid_ssl".to_string()));
}

#[tokio::test]
async fn trusted_repo_host_reports_no_threats() {
    let result = analyzer(healthy_observation(), None)
        .scan("https://github.com/user/repo")
        .await
        .unwrap();

    assert_eq!(result.status, ScanStatus::Safe);
    assert_eq!(result.message, "No threats detected");
    assert_eq!(result.details.domain.dampening_factor, 0.2);
}

#[tokio::test]
async fn unparseable_input_is_invalid() {
    let result = analyzer(healthy_observation(), None).scan("not a url").await;
    assert!(matches!(result, Err(HawkError::InvalidUrl(_))));
}

#[tokio::test]
async fn scan_is_deterministic_with_fixed_inputs() {
    let first = analyzer(healthy_observation(), None)
        .scan("https://login-verify.example.tk/account")
        .await
        .unwrap();
    let second = analyzer(healthy_observation(), None)
        .scan("https://login-verify.example.tk/account")
        .await
        .unwrap();

    let mut a = serde_json::to_value(&first).unwrap();
    let mut b = serde_json::to_value(&second).unwrap();
    // Wall-clock timing is the only legitimately varying field.
    a["details"]["analysis_time_ms"] = serde_json::Value::Null;
    b["details"]["analysis_time_ms"] = serde_json::Value::Null;
    assert_eq!(a, b);
}

#[tokio::test]
async fn fully_failed_network_still_yields_a_verdict() {
    let result = analyzer(NetworkObservation::default(), None)
        .scan("https://example.org/")
        .await
        .unwrap();

    let network = &result.details.network;
    assert!(network.dns_resolved.is_none());
    assert!(network.ssl_valid.is_none());
    assert!(network.http_status.is_none());
    assert!(result.risk_score >= 0.0 && result.risk_score <= 1.0);
}

#[tokio::test]
async fn zero_deadline_reports_timeout() {
    let config = AppConfig {
        request_timeout_ms: 0,
        cache_enabled: false,
        ..Default::default()
    };
    let analyzer = Analyzer::new(
        config,
        Arc::new(SuffixList::bundled()),
        Arc::new(urlhawk::reputation::ReputationTable::bundled()),
        Arc::new(Predictor::from_model_path(None)),
        Arc::new(StubProber {
            observation: healthy_observation(),
        }),
        None,
    );
    let result = analyzer.scan("https://example.com/").await.unwrap();
    assert!(matches!(
        result.status,
        ScanStatus::Suspicious | ScanStatus::Danger
    ));
    assert_eq!(result.message, "Analysis timed out");
    assert_eq!(result.risk_score, 0.5);
}

#[tokio::test]
async fn partial_probe_results_survive_the_deadline() {
    let config = AppConfig {
        request_timeout_ms: 500,
        cache_enabled: false,
        ..Default::default()
    };
    let analyzer = Analyzer::new(
        config,
        Arc::new(SuffixList::bundled()),
        Arc::new(urlhawk::reputation::ReputationTable::bundled()),
        Arc::new(Predictor::from_model_path(None)),
        Arc::new(StalledProber {
            observation: healthy_observation(),
        }),
        None,
    );

    let result = analyzer.scan("https://example.com/").await.unwrap();

    // The probe never finished, but the steps it completed before the
    // deadline are in the verdict.
    assert_eq!(result.details.network.dns_resolved, Some(true));
    assert_eq!(result.details.network.http_status, Some(200));
    assert_eq!(result.details.network.ssl_valid, Some(true));
    // The predictor finished well inside the deadline, so the verdict is
    // fully fused rather than the reduced timeout form.
    assert_ne!(result.message, "Analysis timed out");
    assert_eq!(result.status, ScanStatus::Safe);
}

#[tokio::test]
async fn deadline_without_inference_reports_timeout_over_partial_data() {
    let config = AppConfig {
        request_timeout_ms: 0,
        cache_enabled: false,
        ..Default::default()
    };
    let analyzer = Analyzer::new(
        config,
        Arc::new(SuffixList::bundled()),
        Arc::new(urlhawk::reputation::ReputationTable::bundled()),
        Arc::new(Predictor::from_model_path(None)),
        Arc::new(StubProber {
            observation: NetworkObservation {
                dns_resolved: Some(true),
                redirect_count: 6,
                ..Default::default()
            },
        }),
        None,
    );

    let result = analyzer.scan("https://example.com/").await.unwrap();
    assert_eq!(result.message, "Analysis timed out");
    assert_eq!(result.risk_score, 0.5);
    // Whatever the probe published before the deadline still informs the
    // observation and the heuristic factors.
    assert_eq!(result.details.network.dns_resolved, Some(true));
    assert!(result
        .details
        .risk_factors
        .iter()
        .any(|f| f.code == "many_redirects"));
}

#[tokio::test]
async fn ml_unavailable_degrades_to_heuristics() {
    let config = AppConfig {
        cache_enabled: false,
        ..Default::default()
    };
    let analyzer = Analyzer::new(
        config,
        Arc::new(SuffixList::bundled()),
        Arc::new(urlhawk::reputation::ReputationTable::bundled()),
        Arc::new(Predictor::disabled()),
        Arc::new(StubProber {
            observation: healthy_observation(),
        }),
        None,
    );
    let result = analyzer.scan("http://185.23.14.9/login").await.unwrap();
    assert_eq!(result.message, "ML unavailable");
    assert_eq!(result.details.ml.xgb_score, 0.0);
    assert!(factor_codes(&result).contains(&"ip_literal_url".to_string()));
}

#[tokio::test]
async fn wire_contract_shape_is_stable() {
    let result = analyzer(healthy_observation(), None)
        .scan("https://docs.google.com/d/abc")
        .await
        .unwrap();
    let value = serde_json::to_value(&result).unwrap();

    for key in ["status", "message", "risk_score", "details"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    let details = &value["details"];
    for key in ["ml", "domain", "network", "risk_factors", "analysis_time_ms"] {
        assert!(details.get(key).is_some(), "missing details.{key}");
    }
    for key in ["ml_score", "xgb_score", "dampened_score", "explanation"] {
        assert!(details["ml"].get(key).is_some(), "missing ml.{key}");
    }
    for key in [
        "registered_domain",
        "full_domain",
        "reputation_tier",
        "dampening_factor",
        "trust_description",
        "age_days",
        "registrar",
    ] {
        assert!(details["domain"].get(key).is_some(), "missing domain.{key}");
    }
    for key in [
        "dns_resolved",
        "dns_ttl",
        "dns_flags",
        "ssl_valid",
        "ssl_issuer",
        "ssl_days_until_expiry",
        "ssl_is_new_cert",
        "http_status",
        "redirect_count",
        "final_url",
        "content_flags",
    ] {
        assert!(details["network"].get(key).is_some(), "missing network.{key}");
    }
    // Explanations carry the attribution contract.
    if let Some(first) = details["ml"]["explanation"].as_array().and_then(|a| a.first()) {
        for key in ["feature", "shap_value", "feature_value", "direction"] {
            assert!(first.get(key).is_some(), "missing explanation.{key}");
        }
    }
    assert_eq!(details["domain"]["reputation_tier"], "neutral");
}
