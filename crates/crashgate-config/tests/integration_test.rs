//! Integration tests for crashgate-config
//!
//! These tests verify the full config loading pipeline with real file system operations.

use crashgate_config::testing::TestEnvironment;
use crashgate_config::Config;

/// Test config loading from real global config file
#[test]
fn test_load_global_config_from_file() {
    let env = TestEnvironment::new().unwrap();
    env.write_global_config(
        r#"
[controller]
mode = "dialog-url"
pass_to_prior = true
highlight_keys = ["my_crate", "worker"]

[dialog]
title = "Update available"
message = "A fix for this crash is available."
url = "https://example.com/patch"

[termination]
strategy = "abort"
"#,
    )
    .unwrap();

    let config = env.load().unwrap();

    assert_eq!(config.controller.mode, "dialog-url");
    assert!(config.controller.pass_to_prior);
    assert_eq!(config.controller.highlight_keys, vec!["my_crate", "worker"]);
    assert_eq!(config.dialog.title.as_deref(), Some("Update available"));
    assert_eq!(config.dialog.url.as_deref(), Some("https://example.com/patch"));
    assert_eq!(config.termination.strategy, "abort");
}

/// Test config hierarchy: project config overrides global
#[test]
fn test_config_hierarchy_project_overrides_global() {
    let env = TestEnvironment::new().unwrap();
    env.write_global_config(
        r#"
[controller]
highlight_keys = ["global_key"]

[presentation]
viewer = ["crashgate", "view"]
"#,
    )
    .unwrap();
    env.write_project_config(
        r#"
[controller]
highlight_keys = ["project_key"]
"#,
    )
    .unwrap();

    let config = env.load().unwrap();

    // Project key wins, presentation preserved from global
    assert_eq!(config.controller.highlight_keys, vec!["project_key"]);
    assert_eq!(config.presentation.viewer, vec!["crashgate", "view"]);
}

/// A project file that sets one key keeps the other global keys of that section
#[test]
fn test_project_config_merges_within_section() {
    let env = TestEnvironment::new().unwrap();
    env.write_global_config(
        r#"
[controller]
mode = "dialog-url"
force_pass_to_prior = true

[dialog]
url = "https://example.com/global"
title = "Global title"
"#,
    )
    .unwrap();
    env.write_project_config(
        r#"
[controller]
pass_to_prior = true

[dialog]
title = "Project title"
"#,
    )
    .unwrap();

    let config = env.load().unwrap();

    assert_eq!(config.controller.mode, "dialog-url");
    assert!(config.controller.force_pass_to_prior);
    assert!(config.controller.pass_to_prior);
    assert_eq!(config.dialog.title.as_deref(), Some("Project title"));
    assert_eq!(config.dialog.url.as_deref(), Some("https://example.com/global"));
}

/// Missing files fall back to defaults
#[test]
fn test_missing_files_yield_defaults() {
    let env = TestEnvironment::new().unwrap();
    let config = env.load().unwrap();
    assert_eq!(config.controller, Config::default().controller);
    assert_eq!(config.logging.level, "warn");
}

/// Malformed TOML surfaces as a parse error
#[test]
fn test_malformed_project_config_is_an_error() {
    let env = TestEnvironment::new().unwrap();
    env.write_project_config("[controller\nmode = ").unwrap();
    let err = env.load().unwrap_err();
    assert!(matches!(err, crashgate_config::ConfigError::Toml(_)));
}

/// Test partial config with defaults filling in
#[test]
fn test_partial_config_defaults_applied() {
    let partial = r#"
[dialog]
url = "https://example.com"
"#;
    let config: Config = toml::from_str(partial).unwrap();

    assert_eq!(config.dialog.url.as_deref(), Some("https://example.com"));
    assert_eq!(config.controller.mode, "log-page");
    assert!(!config.controller.force_pass_to_prior);
    assert_eq!(config.termination.strategy, "kill");
}

/// load_from reads exactly one file
#[test]
fn test_load_from_explicit_path() {
    let env = TestEnvironment::new().unwrap();
    let path = env.scratch_file("explicit.toml");
    std::fs::write(&path, "[logging]\nlevel = \"trace\"\n").unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.logging.level, "trace");
}
