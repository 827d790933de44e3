use crate::core::psl::SuffixList;
use crate::core::types::{
    DomainTrust, MlDetails, NetworkObservation, NormalizedUrl, RiskFactor, Scheme, Severity,
};
use crate::pipeline::features::HIGH_ABUSE_TLDS;
use crate::pipeline::homograph;

/// Everything a risk rule may look at. Rules are pure functions over this
/// snapshot, so the synthesizer is idempotent by construction.
pub struct RuleInput<'a> {
    pub url: &'a NormalizedUrl,
    pub network: &'a NetworkObservation,
    pub trust: &'a DomainTrust,
    pub ml: &'a MlDetails,
    pub psl: &'a SuffixList,
}

type Rule = fn(&RuleInput) -> Option<RiskFactor>;

/// Registered rules, each owning exactly one code. New codes are added by
/// extending this table.
const RULES: &[Rule] = &[
    ip_literal_url,
    punycode_mixed_script,
    suspicious_tld,
    nonstandard_port,
    recent_cert,
    invalid_ssl,
    many_redirects,
    cross_domain_redirect,
    login_on_nondomain,
    new_domain,
    ml_high_risk,
];

fn factor(code: &str, severity: Severity, message: &str, evidence: Option<String>) -> RiskFactor {
    RiskFactor {
        code: code.to_string(),
        severity,
        message: message.to_string(),
        evidence,
    }
}

fn ip_literal_url(input: &RuleInput) -> Option<RiskFactor> {
    input.url.is_ip_literal.then(|| {
        factor(
            "ip_literal_url",
            Severity::High,
            "URL addresses a raw IP instead of a domain name",
            Some(input.url.host.clone()),
        )
    })
}

fn punycode_mixed_script(input: &RuleInput) -> Option<RiskFactor> {
    let mixed = input
        .url
        .unicode_host
        .split('.')
        .any(homograph::label_has_mixed_scripts);
    mixed.then(|| {
        factor(
            "punycode_mixed_script",
            Severity::Critical,
            "Hostname mixes Unicode scripts within a label (homograph attack)",
            Some(input.url.unicode_host.clone()),
        )
    })
}

fn suspicious_tld(input: &RuleInput) -> Option<RiskFactor> {
    if input.url.is_ip_literal {
        return None;
    }
    let tld = input
        .url
        .registered_domain
        .rsplit('.')
        .next()
        .unwrap_or_default();
    HIGH_ABUSE_TLDS.contains(&tld).then(|| {
        factor(
            "suspicious_tld",
            Severity::Medium,
            "Top-level domain is heavily abused for phishing and malware",
            Some(format!(".{}", tld)),
        )
    })
}

fn nonstandard_port(input: &RuleInput) -> Option<RiskFactor> {
    match input.url.port {
        Some(port) if port != 80 && port != 443 => Some(factor(
            "nonstandard_port",
            Severity::Low,
            "URL targets a non-standard port",
            Some(port.to_string()),
        )),
        _ => None,
    }
}

fn recent_cert(input: &RuleInput) -> Option<RiskFactor> {
    (input.network.ssl_is_new_cert == Some(true)).then(|| {
        factor(
            "recent_cert",
            Severity::Medium,
            "TLS certificate was issued within the last 30 days",
            input.network.ssl_issuer.clone(),
        )
    })
}

fn invalid_ssl(input: &RuleInput) -> Option<RiskFactor> {
    (input.url.scheme == Scheme::Https && input.network.ssl_valid == Some(false)).then(|| {
        factor(
            "invalid_ssl",
            Severity::High,
            "TLS certificate failed validation",
            None,
        )
    })
}

fn many_redirects(input: &RuleInput) -> Option<RiskFactor> {
    (input.network.redirect_count > 3).then(|| {
        factor(
            "many_redirects",
            Severity::Medium,
            "Request went through an unusually long redirect chain",
            Some(format!("{} hops", input.network.redirect_count)),
        )
    })
}

fn cross_domain_redirect(input: &RuleInput) -> Option<RiskFactor> {
    let final_url = input.network.final_url.as_deref()?;
    let final_host = url::Url::parse(final_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))?;
    let final_registered = input.psl.registered_domain(&final_host);
    (input.network.redirect_count > 0 && final_registered != input.url.registered_domain).then(
        || {
            factor(
                "cross_domain_redirect",
                Severity::Medium,
                "Redirect chain ends on a different registered domain",
                Some(final_registered),
            )
        },
    )
}

fn login_on_nondomain(input: &RuleInput) -> Option<RiskFactor> {
    input
        .network
        .content_flags
        .iter()
        .any(|f| f == "login_on_nondomain")
        .then(|| {
            factor(
                "login_on_nondomain",
                Severity::High,
                "Page hosts a credential form posting to a foreign domain",
                None,
            )
        })
}

fn new_domain(input: &RuleInput) -> Option<RiskFactor> {
    match input.trust.age_days {
        Some(age) if age < 30 => Some(factor(
            "new_domain",
            Severity::High,
            "Domain was registered less than 30 days ago",
            Some(format!("{} days", age)),
        )),
        _ => None,
    }
}

fn ml_high_risk(input: &RuleInput) -> Option<RiskFactor> {
    (input.ml.xgb_score >= 0.7).then(|| {
        factor(
            "ml_high_risk",
            Severity::High,
            "Classifier assigns a high malicious probability",
            Some(format!("{:.2}", input.ml.xgb_score)),
        )
    })
}

/// Run every registered rule once and order the output by severity
/// (descending), preserving insertion order inside a severity band with
/// the code as the final tie-breaker.
pub fn detect_risk_factors(input: &RuleInput) -> Vec<RiskFactor> {
    let mut factors: Vec<(usize, RiskFactor)> = RULES
        .iter()
        .filter_map(|rule| rule(input))
        .enumerate()
        .collect();
    factors.sort_by(|(ia, a), (ib, b)| {
        b.severity
            .cmp(&a.severity)
            .then(ia.cmp(ib))
            .then(a.code.cmp(&b.code))
    });
    factors.into_iter().map(|(_, f)| f).collect()
}
