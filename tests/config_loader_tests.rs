use equipment_ledger::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    let keys: Vec<String> = env::vars()
        .map(|(key, _)| key)
        .filter(|key| key.starts_with("LEDGER_"))
        .collect();
    for key in keys {
        unsafe {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

fn loader_for(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(dir.path().to_path_buf())
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    let cfg = loader_for(&temp_dir).load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.database_url, "sqlite://equipment_ledger.db?mode=rwc");
    assert_eq!(cfg.default_threshold, 20);
    assert_eq!(cfg.high_priority_multiplier, 1.5);
    assert_eq!(cfg.max_upload_mb, 10);
    assert!(cfg.vision_api_key.is_none());
    assert!(cfg.seed_equipment_specs);
    cfg.bind_addr().expect("default bind addr parses");
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "LEDGER_API_BIND_ADDR=127.0.0.1:3000\nLEDGER_DEFAULT_THRESHOLD=25\n",
    );
    // Selects the profile before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "LEDGER_PROFILE=test\nLEDGER_API_BIND_ADDR=127.0.0.1:4000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test",
        "LEDGER_API_BIND_ADDR=192.168.0.10:5000\nLEDGER_LOG_LEVEL=debug\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "LEDGER_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    let cfg = loader_for(&temp_dir).load().expect("layered config loads");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.log_level, "debug");
    assert_eq!(cfg.default_threshold, 25);
}

#[test]
fn process_env_overrides_files() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "LEDGER_DEFAULT_THRESHOLD=25\nLEDGER_CORS_ORIGINS=http://a.test\n",
    );
    unsafe {
        env::set_var("LEDGER_DEFAULT_THRESHOLD", "40");
        env::set_var("LEDGER_CORS_ORIGINS", "http://a.test, http://b.test,");
    }

    let result = loader_for(&temp_dir).load();
    clear_env();
    let cfg = result.expect("config loads");

    assert_eq!(cfg.default_threshold, 40);
    assert_eq!(cfg.cors_origins, vec!["http://a.test", "http://b.test"]);
}

#[test]
fn production_profile_requires_strong_jwt_secret() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "LEDGER_PROFILE=prod\n");

    let missing = loader_for(&temp_dir).load();
    assert!(matches!(missing, Err(ConfigError::MissingJwtSecret)));

    write_env_file(
        &temp_dir,
        ".env.prod",
        "LEDGER_JWT_SECRET=too-short\n",
    );
    let weak = loader_for(&temp_dir).load();
    assert!(matches!(weak, Err(ConfigError::WeakJwtSecret { length: 9 })));

    write_env_file(
        &temp_dir,
        ".env.prod.local",
        "LEDGER_JWT_SECRET=0123456789abcdef0123456789abcdef\n",
    );
    let cfg = loader_for(&temp_dir).load().expect("strong secret accepted");
    assert_eq!(cfg.profile, "prod");
    assert!(!cfg.is_development());
}

#[test]
fn invalid_values_are_reported() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "LEDGER_DEFAULT_THRESHOLD=lots\n");
    let result = loader_for(&temp_dir).load();
    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue { ref key, .. }) if key == "LEDGER_DEFAULT_THRESHOLD"
    ));

    write_env_file(&temp_dir, ".env", "LEDGER_API_BIND_ADDR=not-an-address\n");
    let result = loader_for(&temp_dir).load();
    assert!(matches!(result, Err(ConfigError::InvalidBindAddr { .. })));

    write_env_file(&temp_dir, ".env", "LEDGER_SEED_EQUIPMENT_SPECS=maybe\n");
    let result = loader_for(&temp_dir).load();
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
fn partial_bootstrap_admin_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "LEDGER_BOOTSTRAP_ADMIN_USERNAME=admin\n");

    let result = loader_for(&temp_dir).load();

    assert!(matches!(result, Err(ConfigError::IncompleteBootstrapAdmin)));
}

#[test]
fn redacted_json_hides_secrets() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "LEDGER_JWT_SECRET=super-secret-signing-key\nLEDGER_VISION_API_KEY=sk-test-123\n",
    );

    let cfg = loader_for(&temp_dir).load().expect("config loads");
    let json = cfg.redacted_json().unwrap();

    assert!(!json.contains("super-secret-signing-key"));
    assert!(!json.contains("sk-test-123"));
}
