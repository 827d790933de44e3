use std::{
    collections::HashSet,
    net::IpAddr,
    time::Duration,
};

use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::ResolveErrorKind,
    proto::rr::{Name, RData, RecordType},
    TokioAsyncResolver,
};

/// DNS step of the network probe.
///
/// Failures never propagate: resolution problems become flags or absent
/// fields on the report.
pub struct DnsProbe {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

#[derive(Debug, Default, Clone)]
pub struct DnsReport {
    pub resolved: Option<bool>,
    pub ttl: Option<u32>,
    pub flags: Vec<String>,
    pub addresses: Vec<IpAddr>,
}

pub fn is_private_or_reserved(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_unspecified()
                || v4.octets()[0] >= 224
                // carrier-grade NAT 100.64.0.0/10
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // unique local fc00::/7 and link local fe80::/10
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Proxy for "A records with divergent ASNs" without an ASN database:
/// answers spread over more than two distinct /16 networks.
fn divergent_networks(addresses: &[IpAddr]) -> bool {
    let prefixes: HashSet<[u8; 2]> = addresses
        .iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(v4) => {
                let o = v4.octets();
                Some([o[0], o[1]])
            }
            IpAddr::V6(_) => None,
        })
        .collect();
    prefixes.len() > 2
}

impl DnsProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
            timeout,
        }
    }

    pub async fn check(&self, host: &str, is_ip_literal: bool) -> DnsReport {
        let mut report = DnsReport::default();

        // An IP literal needs no resolution; only the range check applies.
        if is_ip_literal {
            if let Ok(addr) = host.parse::<IpAddr>() {
                report.resolved = Some(true);
                report.addresses.push(addr);
                if is_private_or_reserved(addr) {
                    report.flags.push("private_ip".to_string());
                }
            }
            return report;
        }

        let name = match Name::from_ascii(host) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(host, error = %e, "invalid DNS name");
                return report;
            }
        };

        for record_type in [RecordType::A, RecordType::AAAA] {
            let lookup = tokio::time::timeout(
                self.timeout,
                self.resolver.lookup(name.clone(), record_type),
            )
            .await;

            match lookup {
                Ok(Ok(answer)) => {
                    report.resolved = Some(true);
                    for record in answer.record_iter() {
                        if report.ttl.is_none() {
                            report.ttl = Some(record.ttl());
                        }
                        match record.data() {
                            Some(RData::A(a)) => report.addresses.push(IpAddr::V4(a.0)),
                            Some(RData::AAAA(aaaa)) => report.addresses.push(IpAddr::V6(aaaa.0)),
                            _ => {}
                        }
                    }
                }
                Ok(Err(e)) => {
                    if let ResolveErrorKind::NoRecordsFound { .. } = e.kind() {
                        if report.resolved.is_none() {
                            report.resolved = Some(false);
                            if record_type == RecordType::A {
                                report.flags.push("nxdomain".to_string());
                            }
                        }
                    } else {
                        tracing::warn!(host, error = %e, "DNS lookup failed");
                    }
                }
                Err(_) => {
                    tracing::warn!(host, "DNS lookup timed out");
                }
            }
            // One address family answering is enough to call it resolved.
            if report.resolved == Some(true) && record_type == RecordType::A {
                break;
            }
        }

        if report.resolved == Some(true) {
            // A negative A answer left behind by the AAAA pass is stale.
            report.flags.retain(|f| f != "nxdomain");
            if report.ttl.map(|t| t < 5).unwrap_or(false) {
                report.flags.push("very_low_ttl".to_string());
            }
            if report
                .addresses
                .iter()
                .any(|addr| is_private_or_reserved(*addr))
            {
                report.flags.push("private_ip".to_string());
            }
            if divergent_networks(&report.addresses) {
                report.flags.push("multiple_a".to_string());
            }
        }

        report
    }
}
