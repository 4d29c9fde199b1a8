use std::path::PathBuf;
use std::time::Duration;

use beacon::config::{Cli, Config};
use clap::Parser;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.listen_addr(), "127.0.0.1:4221");
    assert_eq!(cfg.server.backlog, 128);
    assert_eq!(cfg.idle_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(cfg.files.root, PathBuf::from("."));
}

#[test]
fn test_config_from_yaml_partial() {
    let cfg = Config::from_yaml_str(
        "server:\n  port: 8080\n  idle_timeout_secs: 0\nfiles:\n  root: /tmp\n",
    )
    .unwrap();

    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.server.host, "127.0.0.1"); // default kept
    assert_eq!(cfg.idle_timeout(), None);
    assert_eq!(cfg.files.root, PathBuf::from("/tmp"));
}

#[test]
fn test_config_from_yaml_rejects_wrong_types() {
    assert!(Config::from_yaml_str("server:\n  port: not-a-port\n").is_err());
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("beacon.yaml");
    std::fs::write(&path, "server:\n  host: 0.0.0.0\n  max_connections: 8\n").unwrap();

    let cfg = Config::from_file(&path).unwrap();
    assert_eq!(cfg.listen_addr(), "0.0.0.0:4221");
    assert_eq!(cfg.server.max_connections, 8);

    assert!(Config::from_file(&dir.path().join("missing.yaml")).is_err());
}

#[test]
fn test_config_set_listen_addr() {
    let mut cfg = Config::default();

    cfg.set_listen_addr("0.0.0.0:3000").unwrap();
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 3000);

    cfg.set_listen_addr("[::1]:8000").unwrap();
    assert_eq!(cfg.server.host, "::1");

    assert!(cfg.set_listen_addr("localhost").is_err());
    assert!(cfg.set_listen_addr("localhost:http").is_err());
    assert!(cfg.set_listen_addr(":80").is_err());
}

#[test]
fn test_config_validate() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.files.root = dir.path().to_path_buf();
    assert!(cfg.validate().is_ok());

    cfg.server.max_connections = 0;
    assert!(cfg.validate().is_err());

    cfg.server.max_connections = 4;
    cfg.files.root = dir.path().join("nope");
    assert!(cfg.validate().is_err());
}

#[test]
fn test_cli_flags_override_file() {
    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("beacon.yaml");
    std::fs::write(&cfg_path, "server:\n  port: 9000\n  backlog: 16\n").unwrap();

    let cli = Cli::try_parse_from([
        "beacon",
        "--config",
        cfg_path.to_str().unwrap(),
        "--port",
        "9100",
        "--directory",
        dir.path().to_str().unwrap(),
        "--idle-timeout",
        "5",
    ])
    .unwrap();
    let cfg = cli.into_config().unwrap();

    assert_eq!(cfg.server.port, 9100);
    assert_eq!(cfg.server.backlog, 16);
    assert_eq!(cfg.files.root, dir.path());
    assert_eq!(cfg.idle_timeout(), Some(Duration::from_secs(5)));
}

#[test]
fn test_cli_listen_then_host_override() {
    let dir = tempfile::tempdir().unwrap();
    let cli = Cli::try_parse_from([
        "beacon",
        "--listen",
        "0.0.0.0:5000",
        "--host",
        "127.0.0.1",
        "-d",
        dir.path().to_str().unwrap(),
    ])
    .unwrap();
    let cfg = cli.into_config().unwrap();

    assert_eq!(cfg.listen_addr(), "127.0.0.1:5000");
}

#[test]
fn test_cli_rejects_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let cli = Cli::try_parse_from([
        "beacon",
        "--directory",
        dir.path().join("missing").to_str().unwrap(),
    ])
    .unwrap();

    assert!(cli.into_config().is_err());
}
