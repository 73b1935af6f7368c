//! Prometheus text exposition format.

use crate::collector::MetricsSnapshot;

pub const INTENSITY_METRIC: &str = "carbon_aware_karmada_operator_carbon_intensity";
pub const RECONCILES_METRIC: &str = "carbon_aware_karmada_operator_reconciles_total";
pub const RECONCILE_ERRORS_METRIC: &str =
    "carbon_aware_karmada_operator_reconcile_errors_total";

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Render a metrics snapshot into Prometheus text format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "# HELP {INTENSITY_METRIC} Carbon intensity of a cluster's grid location.\n"
    ));
    out.push_str(&format!("# TYPE {INTENSITY_METRIC} gauge\n"));
    for s in &snapshot.intensity {
        out.push_str(&format!(
            "{INTENSITY_METRIC}{{cluster=\"{}\",location=\"{}\",active=\"{}\"}} {}\n",
            escape_label(&s.cluster),
            escape_label(&s.location),
            s.active,
            s.value
        ));
    }

    out.push_str(&format!(
        "# HELP {RECONCILES_METRIC} Reconcile cycles started per policy.\n"
    ));
    out.push_str(&format!("# TYPE {RECONCILES_METRIC} counter\n"));
    for (policy, count) in &snapshot.reconciles {
        out.push_str(&format!(
            "{RECONCILES_METRIC}{{policy=\"{}\"}} {count}\n",
            escape_label(policy)
        ));
    }

    out.push_str(&format!(
        "# HELP {RECONCILE_ERRORS_METRIC} Reconcile cycles that failed per policy.\n"
    ));
    out.push_str(&format!("# TYPE {RECONCILE_ERRORS_METRIC} counter\n"));
    for (policy, count) in &snapshot.reconcile_errors {
        out.push_str(&format!(
            "{RECONCILE_ERRORS_METRIC}{{policy=\"{}\"}} {count}\n",
            escape_label(policy)
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{IntensitySample, MetricsReporter, OperatorMetrics};

    fn sample(cluster: &str, location: &str, active: bool, value: f64) -> IntensitySample {
        IntensitySample {
            cluster: cluster.to_string(),
            location: location.to_string(),
            active,
            value,
        }
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&MetricsSnapshot::default());
        assert!(output.contains(&format!("# TYPE {INTENSITY_METRIC} gauge")));
        assert!(output.contains(&format!("# TYPE {RECONCILES_METRIC} counter")));
        assert!(output.contains(&format!("# TYPE {RECONCILE_ERRORS_METRIC} counter")));
    }

    #[test]
    fn render_series() {
        let metrics = OperatorMetrics::new();
        metrics.reconcile_started("default/green");
        metrics.reconcile_failed("default/green");
        metrics.record_intensity("default/green", &[sample("alpha", "DE", true, 302.5)]);

        let output = render_prometheus(&metrics.snapshot());
        assert!(output.contains(
            "carbon_aware_karmada_operator_carbon_intensity\
             {cluster=\"alpha\",location=\"DE\",active=\"true\"} 302.5"
        ));
        assert!(output.contains(
            "carbon_aware_karmada_operator_reconciles_total{policy=\"default/green\"} 1"
        ));
        assert!(output.contains(
            "carbon_aware_karmada_operator_reconcile_errors_total{policy=\"default/green\"} 1"
        ));
    }

    #[test]
    fn labels_are_escaped() {
        assert_eq!(escape_label("a\"b\\c"), "a\\\"b\\\\c");
    }

    #[test]
    fn every_sample_has_labels() {
        let metrics = OperatorMetrics::new();
        metrics.reconcile_started("p");
        metrics.record_intensity("p", &[sample("c", "l", false, 1.0)]);

        for line in render_prometheus(&metrics.snapshot()).lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            assert!(line.contains('{') && line.contains('}'), "line should have labels: {line}");
        }
    }
}
