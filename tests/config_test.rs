//! Loading the sample configuration and evaluating packets against it

mod common;

use common::{addr, packet, sample_config_path, sample_filter, sample_filter_config};
use mavtables_core::config::AppConfig;
use mavtables_filter::{Context, Decision, FilterConfig, RejectReason};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_sample_app_config() {
    let config = AppConfig::from_file(sample_config_path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.queue.capacity, Some(256));
    assert_eq!(
        config.address_pool.timeout(),
        Some(Duration::from_secs(120))
    );
}

#[test]
fn test_sample_filter_config() {
    let config = sample_filter_config();
    config.validate().unwrap();
    assert_eq!(config.default_chain, "default");
    assert_eq!(config.chains.len(), 3);

    let filter = config.into_filter().unwrap();
    assert_eq!(filter.root().name(), "default");
    assert!(!filter.accept_by_default());
    assert_eq!(filter.max_recursion_depth(), 32);
}

#[test]
fn test_sample_filter_decisions() {
    let filter = sample_filter();
    let to = |dest: &str| Context::new(addr(dest));

    // Ground station command to a vehicle
    let cmd = packet("COMMAND_LONG", "255.190", Some("1.1"));
    assert_eq!(
        filter.decide(&cmd, &to("1.1")),
        Decision::Accept { priority: 3 }
    );

    // Ground station command elsewhere falls back to the default chain
    let cmd = packet("COMMAND_LONG", "255.190", Some("2.1"));
    assert_eq!(
        filter.decide(&cmd, &to("2.1")),
        Decision::Accept { priority: -1 }
    );

    // Parameter writes from ground stations are blocked
    let set = packet("PARAM_SET", "255.190", Some("1.1"));
    assert_eq!(
        filter.decide(&set, &to("1.1")),
        Decision::Reject(RejectReason::Explicit)
    );

    // goto decides for good, even when the target chain falls through
    let rds = packet("REQUEST_DATA_STREAM", "255.190", Some("1.1"));
    assert_eq!(
        filter.decide(&rds, &to("1.1")),
        Decision::Accept { priority: 1 }
    );
    assert_eq!(
        filter.decide(&rds, &to("2.1")),
        Decision::Reject(RejectReason::Default)
    );

    // Heartbeats from the blocked component only
    let hb = packet("HEARTBEAT", "10.10", None);
    assert_eq!(
        filter.decide(&hb, &to("1.1")),
        Decision::Reject(RejectReason::Explicit)
    );
    let hb = packet("HEARTBEAT", "10.11", None);
    assert!(filter.decide(&hb, &to("1.1")).is_accept());

    let stats = filter.stats();
    assert_eq!(stats.total, 7);
    assert_eq!(stats.accepted, 4);
    assert_eq!(stats.rejected, 3);
}

#[test]
fn test_recursion_limit_from_config() {
    let yaml = r#"
max_recursion_depth: 4
chains:
  default:
    - action: call
      chain: loop
  loop:
    - action: call
      chain: loop
"#;
    let filter = FilterConfig::from_yaml(yaml).unwrap().into_filter().unwrap();
    let hb = packet("HEARTBEAT", "1.1", None);

    match filter.decide(&hb, &Context::new(addr("0.0"))) {
        Decision::Reject(RejectReason::Recursion(err)) => {
            assert_eq!(err.chain, "loop");
            assert_eq!(err.max_depth, 4);
        }
        other => panic!("Expected recursion rejection, got {:?}", other),
    }
    assert_eq!(filter.stats().recursion_errors, 1);

    // Each decision starts from depth zero
    assert!(!filter.will_accept(&hb, &Context::new(addr("0.0"))).0);
    assert_eq!(filter.stats().recursion_errors, 2);
}

#[test]
fn test_invalid_configs_rejected() {
    let cases = [
        // Undefined target
        "chains:\n  default:\n    - action: call\n      chain: nowhere\n",
        // Missing default chain
        "chains:\n  other:\n    - action: accept\n",
        // Bad subnet
        "chains:\n  default:\n    - action: accept\n      if: { from: 1.1/17 }\n",
        // Reject with a priority
        "chains:\n  default:\n    - action: reject\n      priority: 2\n",
        // Unknown rule key
        "chains:\n  default:\n    - action: accept\n      unless: {}\n",
    ];

    for yaml in cases {
        let result = FilterConfig::from_yaml(yaml).and_then(|c| c.into_filter());
        assert!(result.is_err(), "config should be rejected:\n{}", yaml);
    }
}

#[test]
fn test_filter_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.yaml");

    sample_filter_config().to_file(&path).unwrap();
    let loaded = FilterConfig::from_file(&path).unwrap();
    assert_eq!(loaded.chains.len(), 3);

    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "chains: [not, a, map]").unwrap();
    assert!(FilterConfig::from_file(&path).is_err());
}
