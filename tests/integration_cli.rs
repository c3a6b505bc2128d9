//! End-to-end tests for the `sw` binary.
//!
//! A stub agent executable stands in for the real agent CLI: it records
//! every invocation to a log file and exits with a scripted status, so the
//! tests can observe exactly how often the watcher dispatched and with
//! what arguments - without any real agent, network, or Telegram.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{Duration, Utc};
use tempfile::TempDir;

/// Get the path to the compiled `sw` binary (from target/debug or target/release).
fn sw_binary() -> PathBuf {
    let mut path = std::env::current_exe().expect("could not get current exe path");
    // current_exe is something like target/debug/deps/integration_cli-<hash>
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("sw");
    assert!(
        path.exists(),
        "sw binary not found at {:?}. Run `cargo build` first.",
        path
    );
    path
}

/// A sandbox with a data dir, a stub agent on PATH, and an invocation log.
struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let sandbox = Self {
            root: TempDir::new().unwrap(),
        };
        fs::create_dir_all(sandbox.bin_dir()).unwrap();
        sandbox
    }

    fn data_dir(&self) -> PathBuf {
        self.root.path().join(".safewatch")
    }

    fn bin_dir(&self) -> PathBuf {
        self.root.path().join("bin")
    }

    fn invocation_log(&self) -> PathBuf {
        self.root.path().join("invocations.log")
    }

    /// Install the stub agent executable with the given shell body. The
    /// preamble appends one line per invocation to the log (embedded
    /// newlines in the instruction argument are flattened).
    fn install_agent(&self, body: &str) {
        let script = format!(
            "#!/bin/sh\n\
             printf '%s ' \"$@\" | tr '\\n' ' ' >> \"$INVOCATION_LOG\"\n\
             printf '\\n' >> \"$INVOCATION_LOG\"\n\
             {}\n",
            body
        );
        let path = self.bin_dir().join("stub-agent");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Install a stub that logs its arguments and exits 0.
    fn install_recording_agent(&self) {
        self.install_agent("exit 0");
    }

    /// Point the config at the stub agent.
    fn write_config(&self, extra: &str) {
        let config = format!(
            "[agent]\ncommand = \"stub-agent\"\n\n{}",
            extra
        );
        fs::write(self.data_dir().join("config.toml"), config).unwrap();
    }

    fn invocations(&self) -> Vec<String> {
        match fs::read_to_string(self.invocation_log()) {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Run `sw` with the sandbox PATH and data dir.
    fn sw(&self, args: &[&str]) -> std::process::Output {
        let path_var = format!(
            "{}:{}",
            self.bin_dir().display(),
            std::env::var("PATH").unwrap_or_default()
        );
        Command::new(sw_binary())
            .arg("--dir")
            .arg(self.data_dir())
            .args(args)
            .env("PATH", path_var)
            .env("INVOCATION_LOG", self.invocation_log())
            // Keep the fallback channel unconfigured even if the developer
            // running the tests has real credentials in ~/.config
            .env("HOME", self.root.path())
            .env("XDG_CONFIG_HOME", self.root.path().join("xdg"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .unwrap_or_else(|e| panic!("Failed to run sw {:?}: {}", args, e))
    }

    /// Run `sw` and assert success, returning stdout as string.
    fn sw_ok(&self, args: &[&str]) -> String {
        let output = self.sw(args);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        assert!(
            output.status.success(),
            "sw {:?} failed.\nstdout: {}\nstderr: {}",
            args,
            stdout,
            stderr
        );
        stdout
    }
}

fn book_contents(dir: &Path) -> String {
    fs::read_to_string(dir.join("tasks.jsonl")).unwrap_or_default()
}

fn rfc3339_in(minutes: i64) -> String {
    (Utc::now() + Duration::minutes(minutes)).to_rfc3339()
}

#[test]
fn test_init_creates_data_dir() {
    let sandbox = Sandbox::new();
    let stdout = sandbox.sw_ok(&["init"]);
    assert!(stdout.contains("Initialized safewatch"));
    assert!(sandbox.data_dir().join("config.toml").exists());
    assert!(sandbox.data_dir().join("tasks.jsonl").exists());
    assert!(sandbox.data_dir().join(".gitignore").exists());

    // Second init refuses
    let output = sandbox.sw(&["init"]);
    assert!(!output.status.success());
}

#[test]
fn test_trip_add_and_list() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);
    sandbox.sw_ok(&[
        "trip",
        "add",
        "--id",
        "trip-1",
        &rfc3339_in(600),
        "Home",
        "Airport",
    ]);

    let stdout = sandbox.sw_ok(&["trip", "list"]);
    assert!(stdout.contains("trip-1"));
    assert!(stdout.contains("Home -> Airport"));
    assert!(stdout.contains("[ ]"));

    // Duplicate id refused
    let output = sandbox.sw(&[
        "trip",
        "add",
        "--id",
        "trip-1",
        &rfc3339_in(600),
        "A",
        "B",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_due_trip_fires_exactly_once() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);
    sandbox.install_recording_agent();
    sandbox.write_config("");

    // 3h30m out with the default 4h window: actionable now
    sandbox.sw_ok(&[
        "trip", "add", "--id", "trip-1", &rfc3339_in(210), "Home", "Airport",
    ]);

    sandbox.sw_ok(&["watch", "trips", "--once"]);

    let invocations = sandbox.invocations();
    assert_eq!(invocations.len(), 1, "agent should run once: {:?}", invocations);
    assert!(invocations[0].contains("--agent trip-guardian"));
    assert!(invocations[0].contains("--no-interactive"));
    assert!(invocations[0].contains("--trust-all-tools"));
    assert!(invocations[0].contains("Home -> Airport"));

    // Fired state persisted
    assert!(book_contents(&sandbox.data_dir()).contains("\"fired\":true"));

    // Re-running the cycle over the updated book fires nothing
    sandbox.sw_ok(&["watch", "trips", "--once"]);
    assert_eq!(sandbox.invocations().len(), 1, "no double fire");
}

#[test]
fn test_trip_outside_window_not_dispatched() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);
    sandbox.install_recording_agent();
    sandbox.write_config("");

    // 10 hours out: window not open yet
    sandbox.sw_ok(&[
        "trip", "add", "--id", "trip-1", &rfc3339_in(600), "Home", "Airport",
    ]);

    let stdout = sandbox.sw_ok(&["watch", "trips", "--once"]);
    assert!(sandbox.invocations().is_empty());
    assert!(stdout.contains("reminder in"));
    assert!(!book_contents(&sandbox.data_dir()).contains("\"fired\":true"));
}

#[test]
fn test_failed_agent_leaves_task_unfired() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);
    sandbox.install_agent("echo boom >&2; exit 1");
    sandbox.write_config("");

    sandbox.sw_ok(&[
        "trip", "add", "--id", "trip-1", &rfc3339_in(210), "Home", "Airport",
    ]);

    // Cycle completes (exit 0) despite the agent failure
    sandbox.sw_ok(&["watch", "trips", "--once"]);
    assert_eq!(sandbox.invocations().len(), 1);
    assert!(!book_contents(&sandbox.data_dir()).contains("\"fired\":true"));

    // Still actionable: the next cycle retries
    sandbox.sw_ok(&["watch", "trips", "--once"]);
    assert_eq!(sandbox.invocations().len(), 2);
}

#[test]
fn test_timeout_leaves_task_unfired() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);
    sandbox.install_agent("sleep 10");
    sandbox.write_config("[trips]\ntimeout_secs = 1\n");

    sandbox.sw_ok(&[
        "trip", "add", "--id", "trip-1", &rfc3339_in(210), "Home", "Airport",
    ]);

    let output = sandbox.sw(&["watch", "trips", "--once"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("timed out"), "stderr: {}", stderr);
    assert!(!book_contents(&sandbox.data_dir()).contains("\"fired\":true"));
}

#[test]
fn test_missing_agent_executable_does_not_crash_cycle() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);
    // No stub installed; config still points at it
    sandbox.write_config("");

    sandbox.sw_ok(&[
        "trip", "add", "--id", "trip-1", &rfc3339_in(210), "Home", "Airport",
    ]);

    let output = sandbox.sw(&["watch", "trips", "--once"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
    assert!(!book_contents(&sandbox.data_dir()).contains("\"fired\":true"));
}

#[test]
fn test_malformed_record_does_not_block_siblings() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);
    sandbox.install_recording_agent();
    sandbox.write_config("");

    sandbox.sw_ok(&[
        "trip", "add", "--id", "trip-good", &rfc3339_in(210), "Home", "Airport",
    ]);

    // Corrupt sibling: unparsable departure time
    let book = sandbox.data_dir().join("tasks.jsonl");
    let mut content = fs::read_to_string(&book).unwrap();
    content.push_str(
        "{\"kind\":\"trip\",\"id\":\"trip-bad\",\"depart_at\":\"not-a-time\",\"source\":\"A\",\"destination\":\"B\"}\n",
    );
    fs::write(&book, content).unwrap();

    let output = sandbox.sw(&["watch", "trips", "--once"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("malformed"), "stderr: {}", stderr);

    // The well-formed trip still fired
    assert_eq!(sandbox.invocations().len(), 1);
    assert!(book_contents(&sandbox.data_dir()).contains("trip-good"));
    assert!(book_contents(&sandbox.data_dir()).contains("\"fired\":true"));
}

#[test]
fn test_watch_with_no_book_is_nothing_to_do() {
    let sandbox = Sandbox::new();
    // No init at all: missing book is "nothing to do", exit 0
    let stdout = sandbox.sw_ok(&["watch", "trips", "--once"]);
    assert!(stdout.contains("No trips scheduled"));
}

#[test]
fn test_watch_sos_requires_server_url() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);

    // Startup configuration error: nonzero exit
    let output = sandbox.sw(&["watch", "sos", "--once"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("server_url"), "stderr: {}", stderr);
}

#[test]
fn test_watch_sos_survives_unreachable_server() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);
    sandbox.write_config("[sos]\nserver_url = \"http://127.0.0.1:1\"\n");

    // Transient fetch failure: warning, cycle completes, exit 0
    let output = sandbox.sw(&["watch", "sos", "--once"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pending"), "stderr: {}", stderr);
}

#[test]
fn test_report_requires_monitor_url() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);

    let output = sandbox.sw(&["report"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("api_url"), "stderr: {}", stderr);
}

#[test]
fn test_trip_list_json_output() {
    let sandbox = Sandbox::new();
    sandbox.sw_ok(&["init"]);
    sandbox.sw_ok(&[
        "trip", "add", "--id", "trip-1", &rfc3339_in(600), "Home", "Airport",
    ]);

    let stdout = sandbox.sw_ok(&["--json", "trip", "list"]);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed[0]["id"], "trip-1");
    assert_eq!(parsed[0]["fired"], false);
}
