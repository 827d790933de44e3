use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::core::error::HawkError;
use crate::core::psl::SuffixList;
use crate::core::types::{NetworkObservation, NormalizedUrl, Scheme};
use crate::net::dns::DnsProbe;
use crate::net::http::HttpProbe;
use crate::net::tls::TlsProbe;

/// Observation being assembled for the current request. Probe steps
/// publish their fields the moment they finish, so if the request
/// deadline cancels the probe mid-flight the orchestrator still harvests
/// everything collected so far.
pub type SharedObservation = Arc<Mutex<NetworkObservation>>;

/// Seam between the orchestrator and the live network. The scenario
/// tests substitute a scripted implementation here.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &NormalizedUrl, sink: &SharedObservation);
}

/// Production prober: DNS, TLS and HTTP steps run concurrently, each
/// under its own budget, each failure-isolated, each writing into the
/// shared sink as it completes. A step that did not finish leaves its
/// fields absent.
pub struct LiveProber {
    dns: DnsProbe,
    tls: TlsProbe,
    http: HttpProbe,
}

impl LiveProber {
    pub fn new(config: &AppConfig, psl: Arc<SuffixList>) -> Result<Self, HawkError> {
        let http = HttpProbe::new(
            psl,
            &config.user_agent,
            config.http_timeout(),
            config.max_redirects,
            config.max_body_bytes,
            config.http_global_concurrency,
            config.http_per_host_concurrency,
        )
        .map_err(|e| HawkError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            dns: DnsProbe::new(config.dns_timeout()),
            tls: TlsProbe::new(config.tls_timeout()),
            http,
        })
    }
}

#[async_trait]
impl Prober for LiveProber {
    async fn probe(&self, url: &NormalizedUrl, sink: &SharedObservation) {
        let dns_fut = async {
            let report = self.dns.check(&url.host, url.is_ip_literal).await;
            let mut obs = sink.lock().expect("observation poisoned");
            obs.dns_resolved = report.resolved;
            obs.dns_ttl = report.ttl;
            obs.dns_flags = report.flags;
        };
        let tls_fut = async {
            if url.scheme == Scheme::Https && !url.is_ip_literal {
                let report = self.tls.check(&url.host, url.effective_port()).await;
                let mut obs = sink.lock().expect("observation poisoned");
                obs.ssl_valid = report.valid;
                obs.ssl_issuer = report.issuer;
                obs.ssl_days_until_expiry = report.days_until_expiry;
                obs.ssl_is_new_cert = report.is_new_cert;
            }
        };
        let http_fut = async {
            let report = self.http.check(url).await;
            let mut obs = sink.lock().expect("observation poisoned");
            obs.http_status = report.status;
            obs.redirect_count = report.redirect_count;
            obs.final_url = report.final_url;
            obs.content_flags.extend(report.content_flags);
        };

        tokio::join!(dns_fut, tls_fut, http_fut);
    }
}
