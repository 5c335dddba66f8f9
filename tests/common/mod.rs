#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use disk_tree::model::wire::{ImportRequest, NodeInput};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_dtr") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "dtr.exe" } else { "dtr" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve dtr binary path for integration test"),
    }
}

/// Run the `dtr` binary with `HOME` pointed at `home`, so default config and
/// data paths stay inside the test's temp dir.
pub fn run_cli_case(case_name: &str, home: &Path, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("dtr-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("HOME", home)
        .env("RUST_LOG", "warn")
        .env("RUST_BACKTRACE", "1");
    for (key, _) in std::env::vars() {
        if key.starts_with("DTR_") {
            command.env_remove(key);
        }
    }
    let output = command.output().expect("execute dtr command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Parse the single JSON line a successful command prints.
pub fn json_line(result: &CmdResult) -> serde_json::Value {
    let line = result
        .stdout
        .lines()
        .next()
        .unwrap_or_else(|| panic!("no output; log: {}", result.log_path.display()));
    serde_json::from_str(line)
        .unwrap_or_else(|e| panic!("bad json {line:?}: {e}; log: {}", result.log_path.display()))
}

pub fn batch(items: Vec<NodeInput>, date: &str) -> ImportRequest {
    ImportRequest {
        items,
        update_date: date.to_string(),
    }
}
