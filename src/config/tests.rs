use super::{AppConfig, ExclusivityScope, DEFAULT_HOLD_THRESHOLD_MS};
use crate::playback::PlaybackRate;
use clap::Parser;
use std::time::Duration;

#[test]
fn accepts_valid_defaults() {
    let mut cfg = AppConfig::parse_from(["test-app"]);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.hold_threshold_ms, DEFAULT_HOLD_THRESHOLD_MS);
    assert_eq!(cfg.exclusivity, ExclusivityScope::PerView);
}

#[test]
fn rejects_hold_threshold_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--hold-threshold-ms", "50"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--hold-threshold-ms", "2001"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_hold_threshold_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--hold-threshold-ms", "100"]);
    assert!(cfg.validate().is_ok());

    let mut cfg = AppConfig::parse_from(["test-app", "--hold-threshold-ms", "2000"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_unsupported_default_rate() {
    let mut cfg = AppConfig::parse_from(["test-app", "--default-rate", "1.75"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn default_rate_flows_into_coordinator_config() {
    let mut cfg = AppConfig::parse_from(["test-app", "--default-rate", "1.5"]);
    cfg.validate().expect("1.5 should be valid");
    let runtime = cfg.coordinator_config().expect("runtime config");
    assert_eq!(runtime.default_rate, PlaybackRate::OneAndHalf);
}

#[test]
fn exclusivity_flag_round_trips_into_runtime_config() {
    let mut cfg = AppConfig::parse_from(["test-app", "--exclusivity", "global"]);
    cfg.validate().expect("global scope should be valid");
    let runtime = cfg.coordinator_config().expect("runtime config");
    assert_eq!(runtime.exclusivity, ExclusivityScope::Global);
    assert_eq!(runtime.hold_threshold, Duration::from_millis(500));
}

#[test]
fn rejects_invalid_language_tags() {
    for bad in ["", "   ", "en$", "e", "engl-US", "12-US"] {
        let mut cfg = AppConfig::parse_from(["test-app", "--lang", bad]);
        assert!(cfg.validate().is_err(), "lang '{bad}' should be rejected");
    }
}

#[test]
fn accepts_language_with_region_suffixes() {
    let mut cfg = AppConfig::parse_from(["test-app", "--lang", "pt_BR"]);
    assert!(cfg.validate().is_ok());
    let mut cfg = AppConfig::parse_from(["test-app", "--lang", " de-DE "]);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.lang, "de-DE");
}

#[test]
fn rejects_missing_script_file() {
    let mut cfg = AppConfig::parse_from(["test-app", "--script", "/no/such/voxfeed-script.jsonl"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_blank_input_device() {
    let mut cfg = AppConfig::parse_from(["test-app", "--input-device", "  "]);
    assert!(cfg.validate().is_err());
}

#[test]
fn exclusivity_labels_are_stable() {
    assert_eq!(ExclusivityScope::PerView.label(), "per-view");
    assert_eq!(ExclusivityScope::Global.label(), "global");
}
