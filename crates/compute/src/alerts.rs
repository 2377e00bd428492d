use fusionguard_core::config::ThresholdConfig;
use fusionguard_core::{AlertEvent, RiskPoint, Severity};

pub const ALERT_KIND: &str = "alert";

/// Risk at or above this level is reported as high severity.
pub const HIGH_SEVERITY_RISK: f64 = 0.9;

fn severity(risk: f64) -> Severity {
    if risk >= HIGH_SEVERITY_RISK {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn alert(point: &RiskPoint, horizon: &str, risk: f64) -> AlertEvent {
    AlertEvent {
        shot_id: point.shot_id.clone(),
        ts_unix_ns: point.ts_unix_ns,
        kind: ALERT_KIND.to_string(),
        message: format!("High disruption risk ({horizon}={risk:.3})"),
        severity: severity(risk),
    }
}

/// One alert per horizon whose risk reached its threshold, h50 first.
pub fn derive_alerts(point: &RiskPoint, thresholds: &ThresholdConfig) -> Vec<AlertEvent> {
    let mut alerts = Vec::new();
    if point.risk_h50 >= thresholds.risk_h50_alert {
        alerts.push(alert(point, "h50", point.risk_h50));
    }
    if point.risk_h200 >= thresholds.risk_h200_alert {
        alerts.push(alert(point, "h200", point.risk_h200));
    }
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(h50: f64, h200: f64) -> RiskPoint {
        RiskPoint {
            shot_id: "s9".into(),
            ts_unix_ns: 42,
            risk_h50: h50,
            risk_h200: h200,
            model_version: "m".into(),
            calibration_version: "c".into(),
            top_features: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    #[test]
    fn below_threshold_is_quiet() {
        assert!(derive_alerts(&point(0.5, 0.5), &ThresholdConfig::default()).is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let alerts = derive_alerts(&point(0.8, 0.1), &ThresholdConfig::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "High disruption risk (h50=0.800)");
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(alerts[0].kind, "alert");
        assert_eq!(alerts[0].shot_id, "s9");
        assert_eq!(alerts[0].ts_unix_ns, 42);
    }

    #[test]
    fn both_horizons_with_severity() {
        let alerts = derive_alerts(&point(0.912, 0.8708), &ThresholdConfig::default());
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].message, "High disruption risk (h50=0.912)");
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[1].message, "High disruption risk (h200=0.871)");
        assert_eq!(alerts[1].severity, Severity::Medium);
    }

    #[test]
    fn per_horizon_thresholds() {
        let thresholds = ThresholdConfig {
            risk_h50_alert: 0.99,
            risk_h200_alert: 0.3,
        };
        let alerts = derive_alerts(&point(0.95, 0.905), &thresholds);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("h200"));
        assert_eq!(alerts[0].severity, Severity::High);
    }
}
