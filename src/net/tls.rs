use std::{sync::Arc, time::Duration};

use chrono::Utc;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::FromDer;
use x509_parser::certificate::X509Certificate;

/// Days after notBefore during which a certificate counts as freshly
/// issued.
const NEW_CERT_DAYS: i64 = 30;

#[derive(Debug, Default, Clone)]
pub struct TlsReport {
    pub valid: Option<bool>,
    pub issuer: Option<String>,
    pub days_until_expiry: Option<i64>,
    pub is_new_cert: Option<bool>,
}

/// TLS step of the network probe: one handshake against the system-style
/// webpki trust store, then leaf-certificate inspection.
pub struct TlsProbe {
    connector: TlsConnector,
    timeout: Duration,
}

impl TlsProbe {
    pub fn new(timeout: Duration) -> Self {
        let mut roots = RootCertStore::empty();
        roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        }
    }

    pub async fn check(&self, host: &str, port: u16) -> TlsReport {
        let mut report = TlsReport::default();

        let server_name = match ServerName::try_from(host) {
            Ok(name) => name,
            Err(_) => return report,
        };

        let handshake = async {
            let tcp = TcpStream::connect((host, port)).await?;
            self.connector.connect(server_name, tcp).await
        };

        match tokio::time::timeout(self.timeout, handshake).await {
            Ok(Ok(stream)) => {
                // Handshake succeeded: chain validated and hostname matched.
                report.valid = Some(true);
                if let Some(certs) = stream.get_ref().1.peer_certificates() {
                    if let Some(leaf) = certs.first() {
                        inspect_leaf(&leaf.0, &mut report);
                    }
                }
            }
            Ok(Err(e)) => {
                if is_certificate_error(&e) {
                    report.valid = Some(false);
                } else {
                    tracing::warn!(host, error = %e, "TLS connection failed");
                }
            }
            Err(_) => {
                tracing::warn!(host, "TLS handshake timed out");
            }
        }

        report
    }
}

fn is_certificate_error(err: &std::io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .map(|e| matches!(e, rustls::Error::InvalidCertificate(_)))
        .unwrap_or_else(|| err.to_string().to_lowercase().contains("certificate"))
}

fn inspect_leaf(der: &[u8], report: &mut TlsReport) {
    let Ok((_, cert)) = X509Certificate::from_der(der) else {
        return;
    };

    report.issuer = cert
        .issuer()
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string)
        .or_else(|| Some(cert.issuer().to_string()));

    let now = Utc::now().timestamp();
    let not_after = cert.validity().not_after.timestamp();
    let not_before = cert.validity().not_before.timestamp();
    report.days_until_expiry = Some((not_after - now) / 86_400);
    report.is_new_cert = Some((now - not_before) / 86_400 < NEW_CERT_DAYS);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_report_is_fully_absent() {
        let report = TlsReport::default();
        assert!(report.valid.is_none());
        assert!(report.issuer.is_none());
        assert!(report.days_until_expiry.is_none());
        assert!(report.is_new_cert.is_none());
    }

    #[test]
    fn ip_literal_server_name_yields_absent_report() {
        // rustls 0.21 ServerName rejects IP strings; the probe must not
        // panic and must leave every field unset.
        let probe = TlsProbe::new(Duration::from_millis(10));
        let report = futures_block_on(probe.check("256.1.1.1", 443));
        assert!(report.valid.is_none());
    }

    fn futures_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
