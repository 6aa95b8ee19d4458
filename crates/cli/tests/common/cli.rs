//! Runs the `trefresh` binary and captures its output

use anyhow::{bail, Context, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

/// Builder for one `trefresh` invocation
pub struct Trefresh {
    cwd: PathBuf,
    config: Option<PathBuf>,
    args: Vec<OsString>,
}

impl Trefresh {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            config: None,
            args: Vec::new(),
        }
    }

    /// Pass `--config <path>` so the user's own config file is never read
    pub fn config(mut self, path: impl AsRef<Path>) -> Self {
        self.config = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    pub fn run(&self) -> Result<Run> {
        let mut command = Command::new(env!("CARGO_BIN_EXE_trefresh"));
        command.current_dir(&self.cwd).env("RUST_LOG", "error");
        if let Some(config) = &self.config {
            command.arg("--config").arg(config);
        }
        command.args(&self.args);

        let start = Instant::now();
        let output = command
            .output()
            .with_context(|| format!("Failed to run trefresh {:?}", self.args))?;
        Ok(Run {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
            elapsed: start.elapsed(),
        })
    }

    /// Run and require exit code 0
    pub fn succeeds(&self) -> Result<Run> {
        let run = self.run()?;
        if !run.success() {
            bail!(
                "trefresh {:?} exited with {:?}\nstdout:\n{}\nstderr:\n{}",
                self.args,
                run.code,
                run.stdout,
                run.stderr
            );
        }
        Ok(run)
    }

    /// Run and require a non-zero exit
    pub fn fails(&self) -> Result<Run> {
        let run = self.run()?;
        if run.success() {
            bail!(
                "trefresh {:?} unexpectedly succeeded\nstdout:\n{}",
                self.args,
                run.stdout
            );
        }
        Ok(run)
    }
}

/// Captured result of one invocation
#[derive(Debug)]
pub struct Run {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
    pub elapsed: Duration,
}

impl Run {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.stdout)
            .with_context(|| format!("stdout is not JSON:\n{}", self.stdout))
    }
}
