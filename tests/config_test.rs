use std::collections::HashMap;

use keyseq::bounded::BoundedStrategy;
use keyseq::config::Config;
use keyseq::error::Error;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| vars.get(name).cloned()
}

#[test]
fn config_defaults_without_variables() {
    let config = Config::from_lookup(lookup(&[])).unwrap();
    assert!(config.threads >= 1);
    assert_eq!(config.max_in_flight, None);
    assert_eq!(config.strategy, BoundedStrategy::Block);
    assert_eq!(config.otel_endpoint, None);
    assert_eq!(config.log_level, "info");
}

#[test]
fn config_reads_every_variable() {
    let config = Config::from_lookup(lookup(&[
        ("KEYSEQ_THREADS", "12"),
        ("KEYSEQ_MAX_IN_FLIGHT", " 64 "),
        ("KEYSEQ_STRATEGY", "reject"),
        ("OTEL_ENDPOINT", "http://localhost:4317"),
        ("LOG_LEVEL", "keyseq=debug"),
    ]))
    .unwrap();

    assert_eq!(config.threads, 12);
    assert_eq!(config.max_in_flight, Some(64));
    assert_eq!(config.strategy, BoundedStrategy::Reject);
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(config.log_level, "keyseq=debug");
}

#[test]
fn config_treats_empty_endpoint_as_unset() {
    let config = Config::from_lookup(lookup(&[("OTEL_ENDPOINT", "")])).unwrap();
    assert_eq!(config.otel_endpoint, None);
}

#[test]
fn config_fails_on_unparseable_values() {
    let result = Config::from_lookup(lookup(&[("KEYSEQ_THREADS", "many")]));
    assert!(matches!(result, Err(Error::Config(_))));

    let result = Config::from_lookup(lookup(&[("KEYSEQ_STRATEGY", "spill")]));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn config_fails_on_zero_sizes() {
    let result = Config::from_lookup(lookup(&[("KEYSEQ_THREADS", "0")]));
    assert!(matches!(result, Err(Error::Config(_))));

    let result = Config::from_lookup(lookup(&[("KEYSEQ_MAX_IN_FLIGHT", "0")]));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn config_from_toml_fills_missing_keys_with_defaults() {
    let config = Config::from_toml(
        r#"
        threads = 3
        max_in_flight = 10
        strategy = "reject"
        "#,
    )
    .unwrap();

    assert_eq!(config.threads, 3);
    assert_eq!(config.max_in_flight, Some(10));
    assert_eq!(config.strategy, BoundedStrategy::Reject);
    assert_eq!(config.log_level, "info");
}

#[test]
fn config_from_toml_rejects_unknown_strategy() {
    let result = Config::from_toml(r#"strategy = "spill""#);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn config_survives_a_toml_round_trip() {
    let original = Config::from_lookup(lookup(&[
        ("KEYSEQ_THREADS", "5"),
        ("KEYSEQ_MAX_IN_FLIGHT", "7"),
    ]))
    .unwrap();
    let rendered = toml::to_string(&original).unwrap();
    assert_eq!(Config::from_toml(&rendered).unwrap(), original);
}

#[test]
fn config_from_file_reports_missing_file() {
    let result = Config::from_file(std::path::Path::new("/nonexistent/keyseq.toml"));
    assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("cannot read config")));
}
