//! Tests for TOML config loading, creation, and path resolution.

use super::env::apply_overrides_from;
use super::paths::config_path_from;
use super::*;
use crate::schema::ParleyConfig;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_parley_config.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, parley_common::ConfigError::FileNotFound(_)));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[supabase]
url = "https://abc.supabase.co"
anon_key = "anon"

[realtime]
base_delay_ms = 250
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.supabase.url, "https://abc.supabase.co");
    assert_eq!(config.realtime.base_delay_ms, 250);
    // Defaults preserved
    assert_eq!(config.realtime.max_retries, 3);
    assert_eq!(config.presence.table, "user_presence");
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, parley_common::ConfigError::ParseError(_)));
}

#[test]
fn load_config_with_invalid_values_is_returned_as_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[realtime]
max_retries = 99
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.realtime.max_retries, 99);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parley").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.realtime.max_retries, 3);
    assert_eq!(config.logging.level, "parley=info");
}

#[test]
fn default_config_toml_is_valid() {
    use super::template::default_config_toml;

    let config: ParleyConfig = toml::from_str(&default_config_toml()).unwrap();
    assert_eq!(config.presence.initial_status, "online");
    assert!(crate::validation::validate(&config).is_ok());
}

#[test]
fn default_config_path_is_reasonable() {
    if let Ok(path) = default_config_path() {
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("parley"));
        assert!(path_str.ends_with("config.toml"));
    }
}

#[test]
fn env_overrides_replace_supabase_fields() {
    let mut config = ParleyConfig::default();
    apply_overrides_from(&mut config, |key| match key {
        "PARLEY_SUPABASE_URL" => Some("https://env.supabase.co".into()),
        "PARLEY_USER_ID" => Some("user-7".into()),
        "PARLEY_ACCESS_TOKEN" => Some("   ".into()),
        _ => None,
    });
    assert_eq!(config.supabase.url, "https://env.supabase.co");
    assert_eq!(config.supabase.user_id.as_deref(), Some("user-7"));
    // Blank values are ignored.
    assert!(config.supabase.access_token.is_none());
    assert!(config.supabase.anon_key.is_empty());
}

#[test]
fn config_path_env_override_wins() {
    let path = config_path_from(|key| {
        (key == ENV_CONFIG_PATH).then(|| "/srv/parley/alt.toml".into())
    })
    .unwrap();
    assert_eq!(path, Path::new("/srv/parley/alt.toml"));
}

#[test]
fn empty_config_path_env_is_ignored() {
    if let Ok(path) = config_path_from(|_| Some("".into())) {
        assert!(path.ends_with("parley/config.toml"));
    }
}

#[test]
fn create_default_config_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[realtime]\nmax_retries = 5\n").unwrap();

    let err = create_default_config(&path).unwrap_err();
    assert!(err.to_string().contains("refusing to overwrite"));
    assert_eq!(load_from_path(&path).unwrap().realtime.max_retries, 5);
}

#[cfg(unix)]
#[test]
fn default_config_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    create_default_config(&path).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
