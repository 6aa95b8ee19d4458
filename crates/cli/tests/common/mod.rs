//! Shared fixtures for the CLI tests
#![allow(dead_code)]

pub mod cli;

use cli::Trefresh;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const QUIET_CONFIG: &str = "[logging]\nlevel = \"error\"\n";

/// A small working tree on disk, next to a config file:
///
/// ```text
/// config.toml
/// repo/
///   app/
///     a.txt
///     src/lib.rs
///   docs/readme.md
/// ```
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Self { dir };
        repo.write("app/a.txt", "a");
        repo.write("app/src/lib.rs", "lib");
        repo.write("docs/readme.md", "docs");
        repo.write_config(QUIET_CONFIG);
        repo
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    pub fn outside(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Replace the config file
    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.config_path();
        fs::write(&path, content).unwrap();
        path
    }

    /// Write a JSON lines events file outside the working tree
    pub fn write_events(&self, lines: &[&str]) -> PathBuf {
        let path = self.dir.path().join("events.jsonl");
        fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    /// `trefresh` run from outside the tree with this repo's config
    pub fn trefresh(&self) -> Trefresh {
        Trefresh::new(self.outside()).config(self.config_path())
    }
}
