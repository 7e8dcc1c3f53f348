use super::*;
use serial_test::serial;
use std::env;
use tempfile::tempdir;

fn clear_env() {
    env::remove_var(PORT_ENV);
    env::remove_var(SIGNAL_PORT_ENV);
    env::remove_var(CALL_TIMEOUT_ENV);
}

#[test]
fn test_server_config_defaults_from_empty_yaml() {
    let config: ServerConfig = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config, ServerConfig::default());
    assert_eq!(config.service_name, SERVICE_NAME);
    assert_eq!(config.method_addr(), "127.0.0.1:0");
}

#[test]
fn test_server_config_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("geofenced.yaml");
    std::fs::write(
        &path,
        "port: 7400\nsignal_port: 7401\nname: test-server\ndescription: in-memory store\n",
    )
    .unwrap();

    let config = ServerConfig::from_file(&path).unwrap();
    assert_eq!(config.port, 7400);
    assert_eq!(config.signal_port, 7401);
    assert_eq!(config.name.as_deref(), Some("test-server"));
    assert_eq!(config.signal_addr(), "127.0.0.1:7401");
}

#[test]
fn test_server_config_rejects_bad_yaml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "port: [not a number").unwrap();

    let err = ServerConfig::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
#[serial]
fn test_server_env_overrides() {
    clear_env();
    env::set_var(PORT_ENV, "7500");
    env::set_var(SIGNAL_PORT_ENV, "not-a-port");

    let mut config = ServerConfig::default();
    config.apply_env_overrides();
    assert_eq!(config.port, 7500);
    assert_eq!(config.signal_port, 0, "Unparseable values are ignored");

    clear_env();
}

#[test]
#[serial]
fn test_client_env_overrides() {
    clear_env();
    env::set_var(CALL_TIMEOUT_ENV, "5");
    env::set_var(SIGNAL_PORT_ENV, "7601");

    let config = ClientConfig::from_env();
    assert_eq!(config.call_timeout(), Duration::from_secs(5));
    assert_eq!(config.signal_port, Some(7601));
    assert_eq!(config.port, None);

    clear_env();
}

#[test]
fn test_client_default_timeout_is_thirty_seconds() {
    assert_eq!(ClientConfig::default().call_timeout(), Duration::from_secs(30));
}

#[test]
fn test_huge_timeout_is_clamped() {
    let config = ClientConfig {
        call_timeout_secs: u64::MAX,
        ..ClientConfig::default()
    };
    assert_eq!(
        config.call_timeout(),
        Duration::from_secs(MAX_CALL_TIMEOUT_SECS)
    );
}

#[test]
fn test_explicit_ports_skip_port_file() {
    let config = ClientConfig::with_ports("127.0.0.1", 7000, 7001);
    let (method, signal) = config.endpoints().unwrap();
    assert_eq!(method, "127.0.0.1:7000");
    assert_eq!(signal, "127.0.0.1:7001");
}

#[test]
#[serial]
fn test_missing_ports_come_from_port_file() {
    let dir = tempdir().unwrap();
    env::set_var(geofence_paths::GEOFENCE_HOME_ENV, dir.path());
    write_port_file(
        &geofence_paths::port_file_path().unwrap(),
        &PortFileContent {
            port: 7100,
            signal_port: 7101,
        },
    )
    .unwrap();

    let config = ClientConfig {
        port: Some(7200),
        ..ClientConfig::default()
    };
    let (method, signal) = config.endpoints().unwrap();
    assert_eq!(method, "127.0.0.1:7200");
    assert_eq!(signal, "127.0.0.1:7101");

    env::remove_var(geofence_paths::GEOFENCE_HOME_ENV);
}

#[test]
fn test_port_file_round_trip_and_garbage() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("geofenced.port");
    let content = PortFileContent {
        port: 1,
        signal_port: 2,
    };
    write_port_file(&path, &content).unwrap();
    assert_eq!(read_port_file(&path).unwrap(), content);

    std::fs::write(&path, "garbage").unwrap();
    assert!(read_port_file(&path).is_err());
}
