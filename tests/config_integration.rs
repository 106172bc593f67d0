use graphrag_qa::config::{AppConfig, RunMode};
use serial_test::serial;
use std::env;
use std::fs;

const ARGS: [&str; 1] = ["graphrag-qa"];

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        for key in [
            "GRAPHRAG_SERVER__PORT",
            "GRAPHRAG_RETRIEVAL__TOP_K",
            "GRAPHRAG_RETRIEVAL__GLOBAL_KEYWORDS",
            "GRAPHRAG_RETRIEVAL__MAX_ITEMS",
            "GRAPHRAG_RETRIEVAL__HOP_DECAY",
            "GRAPHRAG_CACHE__ENABLED",
            "CONFIG_FILE",
            "APP_MODE",
            "HOST",
            "PORT",
            "RATE_LIMIT_ENABLED",
            "CORPUS_DIR",
            "BENCHMARK_QUESTIONS",
            "BENCHMARK_CONCURRENCY",
        ] {
            env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config");
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.mode, RunMode::Serve);
    assert_eq!(config.retrieval.max_items, 20);
    assert_eq!(config.composer.token_budget, 2000);
    assert_eq!(config.generator.max_attempts, 3);
    assert!(config.retrieval.global_keywords.iter().any(|k| k == "overview"));
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("GRAPHRAG_SERVER__PORT", "9090");
        env::set_var("GRAPHRAG_RETRIEVAL__TOP_K", "7");
        env::set_var("GRAPHRAG_CACHE__ENABLED", "false");
        env::set_var("GRAPHRAG_RETRIEVAL__GLOBAL_KEYWORDS", "themes,landscape");
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.retrieval.top_k, 7);
    assert!(!config.cache.enabled);
    assert_eq!(config.retrieval.global_keywords, vec!["themes", "landscape"]);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let config_content = r#"
server:
  port: 7070
composer:
  tokenizer: words
  token_budget: 512
    "#;

    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("graphrag.yaml");
    fs::write(&file_path, config_content).expect("Failed to write temp config");

    // Tell AppConfig to use this file via Env Var (mocking CLI arg indirectly)
    unsafe {
        env::set_var("CONFIG_FILE", &file_path);
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.composer.tokenizer, "words");
    assert_eq!(config.composer.token_budget, 512);
    // Untouched sections keep their defaults
    assert_eq!(config.retrieval.top_k, 5);

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    clear_env_vars();

    let result = AppConfig::load_from_args(["graphrag-qa", "--config", "/nonexistent/graphrag.yaml"]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    // Create ./config.yaml
    let config_content = r#"
server:
  port: 6060
    "#;
    let cwd_path = "config.yaml";
    fs::write(cwd_path, config_content).expect("Failed to write ./config.yaml");

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config");

    let result = std::panic::catch_unwind(|| {
        assert_eq!(config.server.port, 6060);
    });

    fs::remove_file(cwd_path).unwrap();

    if let Err(e) = result {
        std::panic::resume_unwind(e);
    }
}

#[test]
#[serial]
fn test_cli_overrides_env_and_file() {
    clear_env_vars();
    unsafe {
        env::set_var("GRAPHRAG_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args([
        "graphrag-qa",
        "--port",
        "5050",
        "--mode",
        "benchmark",
        "--questions-file",
        "questions.json",
        "--concurrency",
        "8",
    ])
    .expect("Failed to load config");

    assert_eq!(config.server.port, 5050);
    assert_eq!(config.mode, RunMode::Benchmark);
    assert_eq!(config.benchmark.questions_file.as_deref(), Some("questions.json"));
    assert_eq!(config.benchmark.concurrency, 8);

    clear_env_vars();
}

#[test]
#[serial]
fn test_zero_max_items_is_rejected() {
    clear_env_vars();
    unsafe {
        env::set_var("GRAPHRAG_RETRIEVAL__MAX_ITEMS", "0");
    }

    let err = AppConfig::load_from_args(["graphrag-qa"]).unwrap_err();
    assert!(err.to_string().contains("max_items"), "{err}");

    clear_env_vars();
}

#[test]
#[serial]
fn test_hop_decay_out_of_range_is_rejected() {
    clear_env_vars();
    for value in ["-0.5", "1.5"] {
        unsafe {
            env::set_var("GRAPHRAG_RETRIEVAL__HOP_DECAY", value);
        }
        let err = AppConfig::load_from_args(["graphrag-qa"]).unwrap_err();
        assert!(err.to_string().contains("hop_decay"), "{value}: {err}");
    }

    unsafe {
        env::set_var("GRAPHRAG_RETRIEVAL__HOP_DECAY", "0.25");
    }
    let config = AppConfig::load_from_args(["graphrag-qa"]).expect("valid decay");
    assert_eq!(config.retrieval.hop_decay, 0.25);

    clear_env_vars();
}
