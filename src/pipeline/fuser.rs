use crate::core::types::{
    DomainTrust, MlDetails, NetworkObservation, ReputationTier, RiskFactor, ScanDetails,
    ScanResult, ScanStatus, Severity,
};

const DANGER_THRESHOLD: f64 = 0.60;
const SUSPICIOUS_THRESHOLD: f64 = 0.30;
const SEVERITY_BOOST_CAP: f64 = 0.5;

fn severity_boost(factors: &[RiskFactor]) -> f64 {
    let mut boost: f64 = 0.0;
    for f in factors {
        boost += match f.severity {
            Severity::Critical => 0.15,
            Severity::High => 0.08,
            Severity::Medium => 0.03,
            Severity::Low => 0.0,
        };
    }
    boost.min(SEVERITY_BOOST_CAP)
}

fn status_for(risk_score: f64, trust: &DomainTrust, factors: &[RiskFactor]) -> ScanStatus {
    let any_critical = factors.iter().any(|f| f.severity == Severity::Critical);
    let any_high = factors.iter().any(|f| f.severity == Severity::High);
    let untrusted = trust.reputation_tier == ReputationTier::Untrusted;

    if risk_score >= DANGER_THRESHOLD || any_critical || (untrusted && any_high) {
        ScanStatus::Danger
    } else if risk_score >= SUSPICIOUS_THRESHOLD || any_high || untrusted {
        ScanStatus::Suspicious
    } else {
        ScanStatus::Safe
    }
}

fn message_for(status: ScanStatus, factors: &[RiskFactor], ml_available: bool) -> String {
    if !ml_available {
        return "ML unavailable".to_string();
    }
    let top = factors.first();
    match (status, top) {
        (ScanStatus::Danger, Some(f)) => format!("High risk detected: {}", f.message),
        (ScanStatus::Danger, None) => "High risk detected".to_string(),
        (ScanStatus::Suspicious, Some(f)) => format!("Suspicious: {}", f.message),
        (ScanStatus::Suspicious, None) => "Suspicious patterns detected".to_string(),
        (ScanStatus::Safe, _) => "No threats detected".to_string(),
    }
}

/// Fuse the ML probability, domain trust and heuristic risk factors into
/// the final calibrated verdict.
///
/// The dampened score is `min(1, xgb * dampening + severity_boost)`;
/// increasing `xgb` with trust and factors held fixed can therefore never
/// lower the risk score.
pub fn fuse(
    mut ml: MlDetails,
    trust: DomainTrust,
    factors: Vec<RiskFactor>,
    network: NetworkObservation,
    analysis_time_ms: Option<u64>,
    ml_available: bool,
) -> ScanResult {
    let boost = severity_boost(&factors);
    let dampened = (ml.xgb_score * trust.dampening_factor + boost).clamp(0.0, 1.0);
    ml.dampened_score = dampened;

    let status = status_for(dampened, &trust, &factors);
    let message = message_for(status, &factors, ml_available);

    ScanResult {
        status,
        message,
        risk_score: dampened,
        details: ScanDetails {
            ml,
            domain: trust,
            network,
            risk_factors: factors,
            analysis_time_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trust(tier: ReputationTier) -> DomainTrust {
        DomainTrust {
            registered_domain: "example.com".into(),
            full_domain: "example.com".into(),
            reputation_tier: tier,
            dampening_factor: tier.dampening_factor(),
            trust_description: None,
            age_days: None,
            registrar: None,
        }
    }

    fn ml(xgb: f64) -> MlDetails {
        MlDetails {
            ml_score: xgb,
            xgb_score: xgb,
            dampened_score: 0.0,
            explanation: vec![],
        }
    }

    fn rf(code: &str, severity: Severity) -> RiskFactor {
        RiskFactor {
            code: code.into(),
            message: format!("factor {}", code),
            severity,
            evidence: None,
        }
    }

    #[test]
    fn low_score_no_factors_is_safe() {
        let result = fuse(
            ml(0.1),
            trust(ReputationTier::Trusted),
            vec![],
            NetworkObservation::default(),
            Some(5),
            true,
        );
        assert_eq!(result.status, ScanStatus::Safe);
        assert_eq!(result.message, "No threats detected");
        assert!(result.risk_score < 0.3);
    }

    #[test]
    fn critical_factor_forces_danger() {
        let result = fuse(
            ml(0.0),
            trust(ReputationTier::Trusted),
            vec![rf("punycode_mixed_script", Severity::Critical)],
            NetworkObservation::default(),
            None,
            true,
        );
        assert_eq!(result.status, ScanStatus::Danger);
        assert!(result.message.starts_with("High risk detected"));
    }

    #[test]
    fn untrusted_plus_high_forces_danger() {
        let result = fuse(
            ml(0.05),
            trust(ReputationTier::Untrusted),
            vec![rf("invalid_ssl", Severity::High)],
            NetworkObservation::default(),
            None,
            true,
        );
        assert_eq!(result.status, ScanStatus::Danger);
    }

    #[test]
    fn untrusted_alone_is_suspicious() {
        let result = fuse(
            ml(0.05),
            trust(ReputationTier::Untrusted),
            vec![],
            NetworkObservation::default(),
            None,
            true,
        );
        assert_eq!(result.status, ScanStatus::Suspicious);
    }

    #[test]
    fn severity_boost_is_capped() {
        let factors: Vec<RiskFactor> = (0..10)
            .map(|i| rf(&format!("c{}", i), Severity::Critical))
            .collect();
        let result = fuse(
            ml(0.0),
            trust(ReputationTier::Unknown),
            factors,
            NetworkObservation::default(),
            None,
            true,
        );
        assert!(result.risk_score <= 0.5 + f64::EPSILON);
    }

    #[test]
    fn risk_score_is_monotonic_in_xgb() {
        let mut last = -1.0;
        for xgb in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let result = fuse(
                ml(xgb),
                trust(ReputationTier::Neutral),
                vec![rf("suspicious_tld", Severity::Medium)],
                NetworkObservation::default(),
                None,
                true,
            );
            assert!(result.risk_score >= last);
            last = result.risk_score;
        }
    }

    #[test]
    fn trusted_dampens_below_unknown() {
        let trusted = fuse(
            ml(0.8),
            trust(ReputationTier::Trusted),
            vec![],
            NetworkObservation::default(),
            None,
            true,
        );
        let unknown = fuse(
            ml(0.8),
            trust(ReputationTier::Unknown),
            vec![],
            NetworkObservation::default(),
            None,
            true,
        );
        assert!(trusted.details.ml.dampened_score <= unknown.details.ml.dampened_score);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let factors: Vec<RiskFactor> = (0..8)
            .map(|i| rf(&format!("c{}", i), Severity::Critical))
            .collect();
        let result = fuse(
            ml(1.0),
            trust(ReputationTier::Untrusted),
            factors,
            NetworkObservation::default(),
            None,
            true,
        );
        assert!(result.risk_score >= 0.0 && result.risk_score <= 1.0);
    }

    #[test]
    fn ml_unavailable_message() {
        let result = fuse(
            MlDetails::unavailable(),
            trust(ReputationTier::Unknown),
            vec![rf("ip_literal_url", Severity::High)],
            NetworkObservation::default(),
            None,
            false,
        );
        assert_eq!(result.message, "ML unavailable");
        assert_eq!(result.status, ScanStatus::Suspicious);
    }
}
