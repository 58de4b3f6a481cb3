use std::sync::Mutex;

use tempfile::NamedTempFile;

use hardhat::config::ServerConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "HARDHAT_CONFIG",
        "HARDHAT_ADDR",
        "HARDHAT_DB_PATH",
        "HARDHAT_BACKEND",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
addr = "0.0.0.0:9000"
db_path = "site.db"
backend = "hivis"
pairing_distance_px = 75.0
mjpeg_fps = 15.0
max_batch_files = 20
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("HARDHAT_CONFIG", file.path());
    std::env::set_var("HARDHAT_ADDR", "127.0.0.1:9100");
    std::env::set_var("HARDHAT_BACKEND", "stub");

    let cfg = ServerConfig::load().expect("load config");

    assert_eq!(cfg.addr, "127.0.0.1:9100");
    assert_eq!(cfg.db_path, "site.db");
    assert_eq!(cfg.backend, "stub");
    assert_eq!(cfg.pairing_distance_px, 75.0);
    assert_eq!(cfg.mjpeg_fps, 15.0);
    assert_eq!(cfg.max_batch_files, 20);

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ServerConfig::load().expect("load config");
    assert_eq!(cfg.addr, "0.0.0.0:8001");
    assert_eq!(cfg.db_path, "hardhat.db");
    assert_eq!(cfg.backend, "stub");
    assert_eq!(cfg.mjpeg_fps, 30.0);
    assert_eq!(cfg.max_batch_files, 50);
}

#[test]
fn blank_env_overrides_are_ignored() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("HARDHAT_ADDR", "  ");
    let cfg = ServerConfig::load().expect("load config");
    assert_eq!(cfg.addr, "0.0.0.0:8001");

    clear_env();
}

#[test]
fn invalid_file_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"max_batch_files = 0\n").expect("write config");
    std::env::set_var("HARDHAT_CONFIG", file.path());

    assert!(ServerConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("HARDHAT_CONFIG", "/nonexistent/hardhat.toml");
    let err = ServerConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
