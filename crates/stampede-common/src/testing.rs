//! Testing utilities and fixtures

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test context with automatic cleanup
pub struct TestContext {
    pub temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a file relative to the temp directory and return its path
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Test fixtures for common scenarios
pub mod fixtures {
    /// A runner configuration pointing at `uri` with a `$match` on `status`
    pub fn runner_toml(uri: &str, sessions: usize, iterations: usize) -> String {
        format!(
            r#"
[target]
uri = "{uri}"
database = "loadtest"
collection = "orders"
stage = {{ "$match" = {{ status = "active" }} }}

[load]
sessions = {sessions}
iterations = {iterations}
dial_timeout = "5s"
request_timeout = "10s"

[logging]
level = "debug"
format = "text"
"#
        )
    }

    /// Sample order documents as JSON, `count` of them, every other one active
    pub fn sample_orders(count: usize) -> Vec<serde_json::Value> {
        (0..count)
            .map(|i| {
                serde_json::json!({
                    "order_id": i as i64,
                    "status": if i % 2 == 0 { "active" } else { "closed" },
                    "total": i as f64 * 1.5,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;

    #[test]
    fn test_test_context() {
        let ctx = TestContext::new();
        assert!(ctx.path().exists());

        let path = ctx.write_file("hello.txt", "hi");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hi");
    }

    #[test]
    fn test_runner_toml_fixture_is_valid() {
        let text = fixtures::runner_toml("mongodb://localhost:27017", 3, 7);
        let config = RunnerConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.load.sessions, 3);
        assert_eq!(config.load.iterations, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_orders() {
        let orders = fixtures::sample_orders(10);
        assert_eq!(orders.len(), 10);
        assert_eq!(orders[4]["status"], "active");
        assert_eq!(orders[5]["status"], "closed");
    }
}
