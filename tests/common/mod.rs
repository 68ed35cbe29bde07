//! Common test utilities and helpers for integration tests
#![allow(dead_code)]

use mavtables_core::{MavAddress, MavPacket, SharedPacket};
use mavtables_filter::{Filter, FilterConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Path to the sample configuration shipped at the repository root
pub fn sample_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("mavtables.yaml")
}

#[derive(Deserialize)]
struct FilterSection {
    filter: FilterConfig,
}

/// Filter section of the sample configuration
pub fn sample_filter_config() -> FilterConfig {
    let path = sample_config_path();
    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("Failed to read sample config from {:?}", path));
    let section: FilterSection =
        serde_yaml::from_str(&content).expect("Failed to parse sample config");
    section.filter
}

/// Filter built from the sample configuration
pub fn sample_filter() -> Arc<Filter> {
    Arc::new(
        sample_filter_config()
            .into_filter()
            .expect("Sample config should build"),
    )
}

pub fn addr(s: &str) -> MavAddress {
    s.parse()
        .unwrap_or_else(|_| panic!("Invalid address in test: {}", s))
}

/// Packet with the given name, source and optional destination
pub fn packet(name: &str, source: &str, dest: Option<&str>) -> MavPacket {
    let id = match name {
        "HEARTBEAT" => 0,
        "PARAM_SET" => 23,
        "REQUEST_DATA_STREAM" => 66,
        "COMMAND_LONG" => 76,
        _ => 255,
    };
    let builder = MavPacket::builder(id, name).source(addr(source));
    match dest {
        Some(dest) => builder.dest(addr(dest)).build(),
        None => builder.build(),
    }
}

pub fn shared(name: &str, source: &str, dest: Option<&str>) -> SharedPacket {
    packet(name, source, dest).shared()
}
