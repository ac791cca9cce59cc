//! Tests for the full validation pipeline.

use super::*;

#[test]
fn default_config_validates() {
    let config = ParleyConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_max_retries_too_large() {
    let mut config = ParleyConfig::default();
    config.realtime.max_retries = 11;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("realtime.max_retries"));
}

#[test]
fn zero_retries_is_allowed() {
    let mut config = ParleyConfig::default();
    config.realtime.max_retries = 0;
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_base_delay_too_small() {
    let mut config = ParleyConfig::default();
    config.realtime.base_delay_ms = 1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("realtime.base_delay_ms"));
}

#[test]
fn catches_heartbeat_out_of_range() {
    let mut config = ParleyConfig::default();
    config.realtime.heartbeat_interval_secs = 600;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("realtime.heartbeat_interval_secs"));
}

#[test]
fn catches_reconnect_delay_above_ceiling() {
    let mut config = ParleyConfig::default();
    config.realtime.reconnect_delay_secs = 60;
    config.realtime.max_reconnect_delay_secs = 30;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("realtime.reconnect_delay_secs"));
}

#[test]
fn catches_bad_presence_table() {
    let mut config = ParleyConfig::default();
    config.presence.table = "user presence; drop".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.table"));
}

#[test]
fn catches_offline_initial_status() {
    let mut config = ParleyConfig::default();
    config.presence.initial_status = "offline".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.initial_status"));
}

#[test]
fn catches_url_without_scheme() {
    let mut config = ParleyConfig::default();
    config.supabase.url = "abc.supabase.co".into();
    config.supabase.anon_key = "anon".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("supabase.url"));
}

#[test]
fn catches_url_without_anon_key() {
    let mut config = ParleyConfig::default();
    config.supabase.url = "https://abc.supabase.co".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("supabase.anon_key"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = ParleyConfig::default();
    config.realtime.max_retries = 50;
    config.presence.table = "9bad".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("realtime.max_retries"));
    assert!(err.contains("presence.table"));
    assert!(err.contains("; "));
}
