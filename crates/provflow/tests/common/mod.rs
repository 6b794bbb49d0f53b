use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_plan(&self, content: &str) {
        let path = self.root.path().join("provision.kdl");
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    #[allow(dead_code)]
    pub fn report_dir(&self) -> PathBuf {
        self.root.path().join(".provflow").join("runs")
    }

    #[allow(dead_code)]
    pub fn last_report(&self) -> serde_json::Value {
        let content = fs::read_to_string(self.report_dir().join("last-run.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    /// `prov` running inside the project directory
    pub fn prov(&self) -> Command {
        let mut cmd = Command::cargo_bin("prov").unwrap();
        cmd.current_dir(self.path())
            .env_remove("PROVFLOW_CONFIG_PATH")
            .env_remove("PROVFLOW_FILE")
            .env_remove("RUST_LOG");
        cmd
    }

    #[allow(dead_code)]
    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.root.path().join(relative).exists()
    }
}
