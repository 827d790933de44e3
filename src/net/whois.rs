use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::core::error::HawkError;

const IANA_WHOIS: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
const MAX_RESPONSE: usize = 64 * 1024;

#[derive(Debug, Clone, Default)]
pub struct WhoisInfo {
    pub age_days: Option<i64>,
    pub registrar: Option<String>,
    pub creation_date: Option<String>,
}

/// Best-effort registry metadata lookup. Behind a trait so the scenario
/// tests can stub domain ages without opening sockets.
#[async_trait]
pub trait WhoisClient: Send + Sync {
    async fn lookup(&self, registered_domain: &str) -> Result<WhoisInfo, HawkError>;
}

/// Port-43 WHOIS client: asks IANA for the registry referral, then the
/// registry for the domain record.
pub struct TcpWhoisClient {
    timeout: Duration,
}

impl TcpWhoisClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn query(&self, server: &str, domain: &str) -> Result<String, HawkError> {
        let run = async {
            let mut stream = TcpStream::connect((server, WHOIS_PORT))
                .await
                .map_err(|e| HawkError::Network(e.to_string()))?;
            stream
                .write_all(format!("{}\r\n", domain).as_bytes())
                .await
                .map_err(|e| HawkError::Network(e.to_string()))?;

            let mut response = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream
                    .read(&mut buf)
                    .await
                    .map_err(|e| HawkError::Network(e.to_string()))?;
                if n == 0 || response.len() >= MAX_RESPONSE {
                    break;
                }
                response.extend_from_slice(&buf[..n]);
            }
            Ok(String::from_utf8_lossy(&response).to_string())
        };
        tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| HawkError::Timeout)?
    }
}

#[async_trait]
impl WhoisClient for TcpWhoisClient {
    async fn lookup(&self, registered_domain: &str) -> Result<WhoisInfo, HawkError> {
        let referral = self.query(IANA_WHOIS, registered_domain).await?;
        let server = field_value(&referral, &["refer", "whois"])
            .unwrap_or_else(|| IANA_WHOIS.to_string());

        let record = self.query(&server, registered_domain).await?;
        Ok(parse_record(&record))
    }
}

fn field_value(response: &str, keys: &[&str]) -> Option<String> {
    for line in response.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        if keys.iter().any(|k| key == *k) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn parse_record(record: &str) -> WhoisInfo {
    let creation = field_value(
        record,
        &["creation date", "created", "registered on", "registration time"],
    );
    let registrar = field_value(record, &["registrar", "registrar name", "sponsoring registrar"]);

    let age_days = creation
        .as_deref()
        .and_then(parse_creation_date)
        .map(|dt| (Utc::now() - dt).num_days());

    WhoisInfo {
        age_days,
        registrar,
        creation_date: creation,
    }
}

fn parse_creation_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%d-%b-%Y", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iana_referral() {
        let response = "domain: EXAMPLE.COM\nrefer: whois.verisign-grs.com\nstatus: ACTIVE\n";
        assert_eq!(
            field_value(response, &["refer", "whois"]).as_deref(),
            Some("whois.verisign-grs.com")
        );
    }

    #[test]
    fn parses_registry_record() {
        let record = concat!(
            "Domain Name: EXAMPLE.COM\n",
            "Registrar: Example Registrar, Inc.\n",
            "Creation Date: 1995-08-14T04:00:00Z\n",
        );
        let info = parse_record(record);
        assert_eq!(info.registrar.as_deref(), Some("Example Registrar, Inc."));
        assert!(info.age_days.unwrap() > 9000);
    }

    #[test]
    fn parses_bare_dates() {
        assert!(parse_creation_date("2024-01-31").is_some());
        assert!(parse_creation_date("1997-09-15T04:00:00Z").is_some());
        assert!(parse_creation_date("garbage").is_none());
    }

    #[test]
    fn missing_fields_stay_absent() {
        let info = parse_record("Domain Name: EXAMPLE.COM\n");
        assert!(info.age_days.is_none());
        assert!(info.registrar.is_none());
    }
}
