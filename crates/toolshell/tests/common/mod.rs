//! Shared helpers for toolshell CLI tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

const KEY_VARS: [&str; 4] = [
    "TOOLSHELL_API_KEY",
    "GOOGLE_API_KEY",
    "OPENROUTER_API_KEY",
    "OPENAI_API_KEY",
];

/// Isolated home directory with no translator keys in the environment
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let data_dir = temp_dir.path().join(".toolshell");
        Ok(Self { temp_dir, data_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// Command pointed at the temp home
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_toolshell"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env_remove("TOOLSHELL_ENDPOINT_URL");
        cmd.env_remove("RUST_LOG");
        for var in KEY_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    /// Write a config file with the given JSON body
    pub fn write_config(&self, json: &str) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.config_file();
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
