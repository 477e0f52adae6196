use anyhow::Result;
use rand::Rng;
use rstest::*;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn rid() -> String {
    let mut rng = rand::rng();
    let rid: String = (0..10)
        .map(|_| rng.sample(rand::distr::Alphanumeric) as char)
        .collect();
    rid
}

/// Runs the prefixbox binary against a scratch directory that is removed
/// when the fixture is dropped.
pub struct PrefixboxManager {
    pub root: PathBuf,
    pub last_stdout: String,
    pub last_stderr: String,
    pub last_code: Option<i32>,
    /* when set, neither --no-config nor the isolating environment is added */
    pub no_default_options: bool,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    _tmp: TempDir,
}

impl PrefixboxManager {
    pub fn new() -> Self {
        let tmp = tempfile::Builder::new()
            .prefix(&format!("prefixbox-test-{}-", rid()))
            .tempdir()
            .unwrap();
        let root = tmp.path().canonicalize().unwrap();
        Self {
            root,
            last_stdout: String::new(),
            last_stderr: String::new(),
            last_code: None,
            no_default_options: false,
            cwd: None,
            env: Vec::new(),
            _tmp: tmp,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn arg(&self, relative: &str) -> String {
        self.path(relative).to_string_lossy().to_string()
    }

    /// Writes an executable shell script, creating parent directories.
    #[allow(dead_code)]
    pub fn write_script(&self, relative: &str, body: &str) -> Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    #[allow(dead_code)]
    pub fn set_env(&mut self, key: &str, value: &str) {
        self.env.push((key.to_string(), value.to_string()));
    }

    pub fn run(&mut self, args: &[&str]) -> Result<std::process::Output> {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_prefixbox"));
        for (key, _) in std::env::vars() {
            if key.starts_with("PREFIXBOX_") {
                cmd.env_remove(key);
            }
        }
        if !self.no_default_options {
            cmd.arg("--no-config");
            cmd.env("PREFIXBOX_RUNTIME_DIR", self.path("run"));
            cmd.env("PREFIXBOX_BOOSTERS", "false");
            cmd.env("PREFIXBOX_CAPTURE", "pipe");
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd.args(args);
        println!(
            "Running command: {} {}",
            cmd.get_program().to_string_lossy(),
            cmd.get_args()
                .map(|c| c.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = cmd.output()?;
        self.last_stdout = String::from_utf8_lossy(&output.stdout).to_string();
        self.last_stderr = String::from_utf8_lossy(&output.stderr).to_string();
        self.last_code = output.status.code();
        if output.status.success() {
            Ok(output)
        } else {
            Err(anyhow::anyhow!(
                "Command returned {:?}\nstdout: {}\nstderr: {}",
                self.last_code,
                self.last_stdout,
                self.last_stderr
            ))
        }
    }

    pub fn pass(&mut self, args: &[&str]) -> bool {
        if self.run(args).is_ok() {
            return true;
        }
        println!("last_stderr: {}", self.last_stderr);
        println!("last_stdout: {}", self.last_stdout);
        false
    }

    pub fn xfail(&mut self, args: &[&str]) -> bool {
        if self.run(args).is_err() {
            return true;
        }
        println!("last_stderr: {}", self.last_stderr);
        println!("last_stdout: {}", self.last_stdout);
        false
    }

    /// Parses the last stdout as the `--json` document.
    #[allow(dead_code)]
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.last_stdout)?)
    }
}

/// Polls for `path` to appear, for work that finishes after the command
/// returned.
#[allow(dead_code)]
pub fn wait_for_file(path: &Path) -> bool {
    for _ in 0..100 {
        if path.exists() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    false
}

#[fixture]
pub fn prefixbox() -> PrefixboxManager {
    PrefixboxManager::new()
}
