use std::time::Duration;

use cb_core::config::{Config, ConfigError};

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.general.log_format, "human");
    assert!(!cfg.general.json_logs());
    assert_eq!(cfg.daemon.port, 3001);
    assert_eq!(cfg.daemon.host, "127.0.0.1");
    assert_eq!(cfg.daemon.bind_addr(), "127.0.0.1:3001");
    assert_eq!(cfg.bridge.session_prefix, "mf");
    assert_eq!(cfg.bridge.tmux_binary, "tmux");
    assert_eq!(cfg.bridge.initial_cols, 200);
    assert_eq!(cfg.bridge.initial_rows, 50);
    assert_eq!(cfg.delegation.agent_command, "claude");
    assert_eq!(cfg.delegation.settle(), Duration::from_millis(2000));
    assert_eq!(cfg.delegation.prompt_max_chars, 2000);
    assert!(cfg.delegation.ready_marker.is_none());
    cfg.validate().expect("defaults validate");
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("session_prefix"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.daemon.port, cfg.daemon.port);
    assert_eq!(parsed.bridge.session_prefix, cfg.bridge.session_prefix);
    assert_eq!(parsed.delegation.settle_ms, cfg.delegation.settle_ms);
    parsed.validate().expect("config validates");
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[daemon]
port = 1234

[bridge]
session_prefix = "stg"

[delegation]
ready_marker = "? for shortcuts"
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(cfg.daemon.port, 1234);
    assert_eq!(cfg.bridge.prefix().unwrap().as_str(), "stg");
    assert_eq!(cfg.delegation.ready_marker.as_deref(), Some("? for shortcuts"));
    // defaults should fill in the rest
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.bridge.initial_cols, 200);
    cfg.validate().expect("config validates");
}

#[test]
fn invalid_prefix_fails_validation() {
    let mut cfg = Config::default();
    cfg.bridge.session_prefix = "bad prefix".to_string();
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("session_prefix"));
}

#[test]
fn zero_geometry_fails_validation() {
    let mut cfg = Config::default();
    cfg.bridge.initial_rows = 0;
    assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
}

#[test]
fn zero_prompt_cap_fails_validation() {
    let mut cfg = Config::default();
    cfg.delegation.prompt_max_chars = 0;
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("prompt_max_chars"));
}

#[test]
fn unknown_log_format_fails_validation() {
    let mut cfg = Config::default();
    cfg.general.log_format = "xml".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[daemon]\nport = 4242\n").unwrap();

    let cfg = Config::load_from(&path).expect("load config");
    assert_eq!(cfg.daemon.port, 4242);
}

#[test]
fn load_from_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load_from(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn load_from_invalid_toml_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[daemon\nport = ").unwrap();
    assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
}
