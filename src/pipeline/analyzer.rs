use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use crate::config::AppConfig;
use crate::core::cache::ScanCache;
use crate::core::error::HawkError;
use crate::core::hash::cache_key;
use crate::core::psl::SuffixList;
use crate::core::types::{
    MlDetails, NetworkObservation, NormalizedUrl, ScanResult, ScanStatus,
};
use crate::ml::predictor::Predictor;
use crate::net::probe::{LiveProber, Prober, SharedObservation};
use crate::net::whois::{TcpWhoisClient, WhoisClient, WhoisInfo};
use crate::pipeline::features;
use crate::pipeline::fuser::fuse;
use crate::pipeline::normalizer::normalize;
use crate::pipeline::risk::{detect_risk_factors, RuleInput};
use crate::reputation::ReputationTable;

/// Per-request driver for the whole pipeline.
///
/// Owns the immutable shared state (model, reputation table, suffix
/// list, optional cache) and composes the stages under the request
/// deadline. Everything per-request lives on the task's stack; requests
/// are fully independent.
pub struct Analyzer {
    config: AppConfig,
    psl: Arc<SuffixList>,
    reputation: Arc<ReputationTable>,
    predictor: Arc<Predictor>,
    prober: Arc<dyn Prober>,
    whois: Option<Arc<dyn WhoisClient>>,
    cache: Option<ScanCache>,
}

impl Analyzer {
    /// Wire up the production pipeline from configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, HawkError> {
        let psl = Arc::new(SuffixList::load(config.psl_path.as_deref())?);
        let reputation = Arc::new(ReputationTable::load(config.reputation_path.as_deref())?);
        let predictor = Arc::new(Predictor::from_model_path(config.model_path.as_deref()));
        let prober: Arc<dyn Prober> = Arc::new(LiveProber::new(&config, psl.clone())?);
        let whois: Option<Arc<dyn WhoisClient>> = config
            .whois_enabled
            .then(|| Arc::new(TcpWhoisClient::new(config.whois_timeout())) as Arc<dyn WhoisClient>);
        Ok(Self::new(config, psl, reputation, predictor, prober, whois))
    }

    /// Assemble an analyzer from explicit parts (tests inject stub
    /// probers and WHOIS clients here).
    pub fn new(
        config: AppConfig,
        psl: Arc<SuffixList>,
        reputation: Arc<ReputationTable>,
        predictor: Arc<Predictor>,
        prober: Arc<dyn Prober>,
        whois: Option<Arc<dyn WhoisClient>>,
    ) -> Self {
        let cache = config
            .cache_enabled
            .then(|| ScanCache::new(config.cache_ttl(), config.cache_size));
        Self {
            config,
            psl,
            reputation,
            predictor,
            prober,
            whois,
            cache,
        }
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Analyze one URL and return a complete verdict.
    ///
    /// Only invalid input escapes as an error; network trouble degrades
    /// to partial observations. A blown deadline cancels the outstanding
    /// subtasks but keeps whatever the probe and predictor had already
    /// published.
    pub async fn scan(&self, raw_url: &str) -> Result<ScanResult, HawkError> {
        let started = Instant::now();
        let url = normalize(raw_url, &self.psl)?;
        let key = cache_key(&url.request_target());

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                tracing::debug!(url = %url.request_target(), "cache hit");
                return Ok(hit);
            }
        }

        // Probe steps and the predictor publish into these as they
        // finish; the deadline path below harvests them.
        let sink: SharedObservation = Arc::new(Mutex::new(NetworkObservation::default()));
        let ml_slot: Arc<Mutex<Option<MlDetails>>> = Arc::new(Mutex::new(None));

        match tokio::time::timeout(
            self.config.request_timeout(),
            self.analyze(&url, started, &sink, &ml_slot),
        )
        .await
        {
            Ok(result) => {
                let result = result?;
                if let Some(cache) = &self.cache {
                    cache.put(&key, &result);
                }
                Ok(result)
            }
            Err(_) => {
                tracing::warn!(url = %url.request_target(), "analysis deadline exceeded");
                let network = sink.lock().expect("observation poisoned").clone();
                let ml = ml_slot.lock().expect("ml slot poisoned").take();
                Ok(self.deadline_verdict(&url, started, network, ml))
            }
        }
    }

    async fn analyze(
        &self,
        url: &NormalizedUrl,
        started: Instant,
        sink: &SharedObservation,
        ml_slot: &Mutex<Option<MlDetails>>,
    ) -> Result<ScanResult, HawkError> {
        let feature_vector = features::extract(url);

        let probe_fut = self.prober.probe(url, sink);
        let whois_fut = self.whois_lookup(url);
        let ml_fut = async {
            let outcome = self.predictor.predict(feature_vector).await;
            if let Ok(Some(details)) = &outcome {
                *ml_slot.lock().expect("ml slot poisoned") = Some(details.clone());
            }
            outcome
        };

        let ((), whois, ml_outcome) = tokio::join!(probe_fut, whois_fut, ml_fut);
        let network = sink.lock().expect("observation poisoned").clone();

        let trust = self.reputation.classify(url, whois.as_ref());
        let (ml, ml_available) = match ml_outcome {
            Ok(Some(details)) => (details, true),
            Ok(None) => (MlDetails::unavailable(), false),
            Err(e) => {
                tracing::warn!(error = %e, "ML inference failed, degrading to heuristics");
                (MlDetails::unavailable(), false)
            }
        };

        let factors = detect_risk_factors(&RuleInput {
            url,
            network: &network,
            trust: &trust,
            ml: &ml,
            psl: &self.psl,
        });

        let elapsed = started.elapsed().as_millis() as u64;
        Ok(fuse(ml, trust, factors, network, Some(elapsed), ml_available))
    }

    async fn whois_lookup(&self, url: &NormalizedUrl) -> Option<WhoisInfo> {
        let client = self.whois.as_ref()?;
        if url.is_ip_literal {
            return None;
        }
        match tokio::time::timeout(
            self.config.whois_timeout(),
            client.lookup(&url.registered_domain),
        )
        .await
        {
            Ok(Ok(info)) => Some(info),
            Ok(Err(e)) => {
                tracing::warn!(domain = %url.registered_domain, error = %e, "WHOIS lookup failed");
                None
            }
            Err(_) => {
                tracing::warn!(domain = %url.registered_domain, "WHOIS lookup timed out");
                None
            }
        }
    }

    /// Verdict for an expired deadline. The partial observation the
    /// probe published so far is always used. When the predictor had
    /// already finished, the verdict is fused normally over that partial
    /// data; otherwise the reduced heuristic-only form is emitted.
    fn deadline_verdict(
        &self,
        url: &NormalizedUrl,
        started: Instant,
        network: NetworkObservation,
        ml: Option<MlDetails>,
    ) -> ScanResult {
        let trust = self.reputation.classify(url, None);
        let elapsed = started.elapsed().as_millis() as u64;

        if let Some(ml) = ml {
            let factors = detect_risk_factors(&RuleInput {
                url,
                network: &network,
                trust: &trust,
                ml: &ml,
                psl: &self.psl,
            });
            return fuse(ml, trust, factors, network, Some(elapsed), true);
        }

        let mut ml = MlDetails::unavailable();
        ml.dampened_score = 0.5;
        let factors = detect_risk_factors(&RuleInput {
            url,
            network: &network,
            trust: &trust,
            ml: &ml,
            psl: &self.psl,
        });

        let mut result = fuse(ml, trust, factors, network, Some(elapsed), true);
        result.status = if result.status == ScanStatus::Danger {
            ScanStatus::Danger
        } else {
            ScanStatus::Suspicious
        };
        result.message = "Analysis timed out".to_string();
        result.risk_score = 0.5;
        result.details.ml.dampened_score = 0.5;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct SilentProber;

    #[async_trait]
    impl Prober for SilentProber {
        async fn probe(&self, _url: &NormalizedUrl, _sink: &SharedObservation) {}
    }

    fn analyzer_with(config: AppConfig) -> Analyzer {
        Analyzer::new(
            config,
            Arc::new(SuffixList::bundled()),
            Arc::new(ReputationTable::bundled()),
            Arc::new(Predictor::from_model_path(None)),
            Arc::new(SilentProber),
            None,
        )
    }

    #[tokio::test]
    async fn invalid_input_propagates() {
        let analyzer = analyzer_with(AppConfig::default());
        assert!(matches!(
            analyzer.scan("not a url").await,
            Err(HawkError::InvalidUrl(_))
        ));
        assert!(matches!(
            analyzer.scan("ftp://example.com/").await,
            Err(HawkError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn zero_deadline_yields_timeout_verdict() {
        let config = AppConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        let analyzer = analyzer_with(config);
        let result = analyzer.scan("https://example.com/").await.unwrap();
        assert!(matches!(
            result.status,
            ScanStatus::Suspicious | ScanStatus::Danger
        ));
        assert_eq!(result.message, "Analysis timed out");
        assert_eq!(result.risk_score, 0.5);
    }

    #[tokio::test]
    async fn complete_results_are_cached() {
        let analyzer = analyzer_with(AppConfig::default());
        let first = analyzer.scan("https://example.com/").await.unwrap();
        let second = analyzer.scan("https://EXAMPLE.com/").await.unwrap();
        // Same canonical key: the cached verdict is replayed verbatim,
        // including timing.
        assert_eq!(
            first.details.analysis_time_ms,
            second.details.analysis_time_ms
        );
        assert_eq!(first.risk_score, second.risk_score);
    }

    #[tokio::test]
    async fn timeout_verdicts_are_not_cached() {
        let config = AppConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        let analyzer = analyzer_with(config);
        let first = analyzer.scan("https://example.com/").await.unwrap();
        assert_eq!(first.message, "Analysis timed out");
    }
}
