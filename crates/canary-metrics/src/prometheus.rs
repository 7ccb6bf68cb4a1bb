//! Prometheus text exposition format.
//!
//! Renders the failure counters and delivery figures for scraping by a
//! Prometheus server or compatible agent.

use std::fmt::Write;
use std::time::Duration;

use canary_sampling::{DeliveryCounters, Status};
use canary_topic::FailureCounter;

use crate::collector::FailureSample;

/// Prefix of every exported metric.
pub const METRICS_NAMESPACE: &str = "kafka_canary";

/// Delivery figures at render time.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySnapshot {
    pub records_produced: i64,
    pub records_consumed: i64,
    /// Delivery percentage, `-1` while there is no data.
    pub percentage: f64,
    pub time_window: Duration,
}

impl DeliverySnapshot {
    pub fn new(counters: &DeliveryCounters, status: &Status) -> Self {
        Self {
            records_produced: counters.produced(),
            records_consumed: counters.consumed(),
            percentage: status.consuming.percentage,
            time_window: status.consuming.time_window,
        }
    }
}

/// Render failure counters and delivery figures into Prometheus text format.
///
/// Labelled failure counters only appear once incremented; the unlabelled
/// cluster-describe counter is always present.
pub fn render_prometheus(failures: &[FailureSample], delivery: &DeliverySnapshot) -> String {
    let mut out = String::new();

    for counter in FailureCounter::ALL {
        let name = format!("{METRICS_NAMESPACE}_{}", counter.name());
        let _ = writeln!(out, "# HELP {name} {}.", counter.help());
        let _ = writeln!(out, "# TYPE {name} counter");

        let samples: Vec<&FailureSample> =
            failures.iter().filter(|s| s.counter == counter).collect();
        if !counter.labelled_by_topic() && samples.is_empty() {
            let _ = writeln!(out, "{name} 0");
        }
        for s in samples {
            match &s.topic {
                Some(topic) => {
                    let _ = writeln!(out, "{name}{{topic=\"{}\"}} {}", escape_label(topic), s.value);
                }
                None => {
                    let _ = writeln!(out, "{name} {}", s.value);
                }
            }
        }
    }

    let _ = writeln!(
        out,
        "# HELP {METRICS_NAMESPACE}_records_produced_total Total number of records produced."
    );
    let _ = writeln!(out, "# TYPE {METRICS_NAMESPACE}_records_produced_total counter");
    let _ = writeln!(
        out,
        "{METRICS_NAMESPACE}_records_produced_total {}",
        delivery.records_produced
    );

    let _ = writeln!(
        out,
        "# HELP {METRICS_NAMESPACE}_records_consumed_total Total number of records consumed."
    );
    let _ = writeln!(out, "# TYPE {METRICS_NAMESPACE}_records_consumed_total counter");
    let _ = writeln!(
        out,
        "{METRICS_NAMESPACE}_records_consumed_total {}",
        delivery.records_consumed
    );

    let _ = writeln!(
        out,
        "# HELP {METRICS_NAMESPACE}_consumed_percentage Percentage of produced records consumed in the status window (-1 without data)."
    );
    let _ = writeln!(out, "# TYPE {METRICS_NAMESPACE}_consumed_percentage gauge");
    let _ = writeln!(
        out,
        "{METRICS_NAMESPACE}_consumed_percentage {:.2}",
        delivery.percentage
    );

    let _ = writeln!(
        out,
        "# HELP {METRICS_NAMESPACE}_status_time_window_seconds Time window covered by the status samples."
    );
    let _ = writeln!(out, "# TYPE {METRICS_NAMESPACE}_status_time_window_seconds gauge");
    let _ = writeln!(
        out,
        "{METRICS_NAMESPACE}_status_time_window_seconds {}",
        delivery.time_window.as_secs_f64()
    );

    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> DeliverySnapshot {
        DeliverySnapshot {
            records_produced: 1200,
            records_consumed: 1180,
            percentage: 98.33,
            time_window: Duration::from_secs(150),
        }
    }

    fn sample(counter: FailureCounter, topic: Option<&str>, value: u64) -> FailureSample {
        FailureSample {
            counter,
            topic: topic.map(str::to_string),
            value,
        }
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&[], &delivery());
        // Should still have type declarations.
        assert!(output.contains("# HELP kafka_canary_topic_creation_failed_total"));
        assert!(output.contains("# TYPE kafka_canary_topic_creation_failed_total counter"));
        assert!(output.contains("kafka_canary_topic_describe_cluster_error_total 0"));
        assert!(!output.contains("kafka_canary_topic_creation_failed_total{"));
    }

    #[test]
    fn render_labelled_failures() {
        let failures = vec![
            sample(FailureCounter::TopicCreation, Some("__canary"), 3),
            sample(FailureCounter::AlterConfiguration, Some("__canary"), 1),
            sample(FailureCounter::DescribeCluster, None, 2),
        ];
        let output = render_prometheus(&failures, &delivery());

        assert!(output.contains("kafka_canary_topic_creation_failed_total{topic=\"__canary\"} 3"));
        assert!(
            output.contains("kafka_canary_topic_alter_configuration_error_total{topic=\"__canary\"} 1")
        );
        assert!(output.contains("kafka_canary_topic_describe_cluster_error_total 2"));
        assert!(!output.contains("kafka_canary_topic_describe_cluster_error_total 0"));
    }

    #[test]
    fn render_delivery() {
        let output = render_prometheus(&[], &delivery());
        assert!(output.contains("kafka_canary_records_produced_total 1200"));
        assert!(output.contains("kafka_canary_records_consumed_total 1180"));
        assert!(output.contains("kafka_canary_consumed_percentage 98.33"));
        assert!(output.contains("kafka_canary_status_time_window_seconds 150"));
    }

    #[test]
    fn render_no_data_percentage() {
        let mut d = delivery();
        d.percentage = -1.0;
        let output = render_prometheus(&[], &d);
        assert!(output.contains("kafka_canary_consumed_percentage -1.00"));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let failures = vec![sample(FailureCounter::DescribeTopic, Some("t"), 1)];
        let output = render_prometheus(&failures, &delivery());

        // Every non-comment line: metric_name[{labels}] value
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.rsplitn(2, ' ');
            let value = parts.next().unwrap();
            let name = parts.next().unwrap();
            assert!(value.parse::<f64>().is_ok(), "bad value in: {line}");
            assert!(name.starts_with("kafka_canary_"), "bad name in: {line}");
        }
    }
}
