//! Tests for Config loading, saving and profile resolution

use toolshell_config::{CommandStyleConfig, Config, ConfigError, ProfileConfig};
use tempfile::TempDir;

/// Helper to create a temporary directory for tests
fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[tokio::test]
async fn test_load_missing_file_gives_defaults() {
    let dir = temp_dir();
    let path = dir.path().join("absent.json");

    let config = Config::load_from(&path).await.unwrap();
    assert_eq!(config.default_profile, "generic");
    assert_eq!(config.driver.max_iterations, 25);
}

#[tokio::test]
async fn test_save_then_load() {
    let dir = temp_dir();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.translator.api_key = "k-123".to_string();
    config.translator.model = Some("gemini-2.0-flash".to_string());
    config.endpoint.url = "http://localhost:7000".to_string();
    config.driver.max_iterations = 7;
    config.save_to(&path).await.unwrap();

    let loaded = Config::load_from(&path).await.unwrap();
    assert_eq!(loaded.api_key(), Some("k-123".to_string()));
    assert_eq!(loaded.translator.model.as_deref(), Some("gemini-2.0-flash"));
    assert_eq!(loaded.endpoint.url, "http://localhost:7000");
    assert_eq!(loaded.driver.max_iterations, 7);
}

#[tokio::test]
async fn test_partial_json_fills_defaults() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, r#"{"driver": {"max_iterations": 3}}"#)
        .await
        .unwrap();

    let config = Config::load_from(&path).await.unwrap();
    assert_eq!(config.driver.max_iterations, 3);
    assert_eq!(config.driver.step_pause_ms, 500);
    assert_eq!(config.endpoint.timeout_secs, 60);
    assert_eq!(config.translator.max_history_messages, 20);
}

#[tokio::test]
async fn test_invalid_json_is_error() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let result = Config::load_from(&path).await;
    assert!(matches!(result, Err(ConfigError::Json(_))));
}

#[tokio::test]
async fn test_user_profile_overrides_builtin() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    let json = r#"{
        "profiles": {
            "gcloud": {
                "prompt": "gc",
                "endpoint_url": "http://gcloud-tools:8080",
                "command_style": {"style": "argv", "tool": "gcloud_exec", "argument": "argv"}
            },
            "monitoring": {
                "prompt": "monitoring",
                "system_instruction": "Translate to monitoring tool calls."
            }
        }
    }"#;
    tokio::fs::write(&path, json).await.unwrap();

    let config = Config::load_from(&path).await.unwrap();

    let gcloud = config.profile("gcloud").unwrap();
    assert_eq!(gcloud.prompt, "gc");
    assert_eq!(
        gcloud.command_style,
        CommandStyleConfig::Argv {
            tool: "gcloud_exec".to_string(),
            argument: "argv".to_string(),
            strip_prefix: None,
        }
    );
    assert_eq!(config.endpoint_url_for(&gcloud), "http://gcloud-tools:8080");

    let monitoring = config.profile("monitoring").unwrap();
    assert_eq!(monitoring.command_style, CommandStyleConfig::KeyValue);
    assert_eq!(config.endpoint_url_for(&monitoring), "http://localhost:5001");

    let names = config.profile_names();
    assert!(names.contains(&"monitoring".to_string()));
    assert!(names.contains(&"sequential-thinking".to_string()));
    assert_eq!(names.iter().filter(|n| *n == "gcloud").count(), 1);
}

#[test]
fn test_empty_endpoint_override_falls_back() {
    let config = Config::default();
    let profile = ProfileConfig {
        endpoint_url: Some(String::new()),
        ..ProfileConfig::default()
    };
    assert_eq!(config.endpoint_url_for(&profile), "http://localhost:5001");
}

#[test]
fn test_profiles_not_serialized_when_empty() {
    let json = serde_json::to_string(&Config::default()).unwrap();
    assert!(!json.contains("profiles"));
    assert!(json.contains("\"default_profile\":\"generic\""));
}
