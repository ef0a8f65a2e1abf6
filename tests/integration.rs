/// Integration test suite: drives the compiled `watch` binary against throwaway directories.
///
/// All tests invoke the binary via subprocess. The `CARGO_BIN_EXE_watch` environment variable
/// is set by Cargo during `cargo test` to point to the compiled binary for the current profile.
///
/// Long-running tests start `watch` in the background, touch files in a temp directory until
/// the expected output shows up (the watches may not be registered the instant the process
/// starts), then kill the process.
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_watch"))
}

/// Run `watch` to completion and assert it exits successfully.
/// Returns stdout as a String.
fn run_success(args: &[&str]) -> String {
    let out = Command::new(binary())
        .args(args)
        .output()
        .expect("failed to invoke watch binary");
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    assert!(
        out.status.success(),
        "command {:?} failed with status {:?}\nstdout: {}\nstderr: {}",
        args,
        out.status,
        stdout,
        stderr
    );
    stdout
}

/// Run `watch` to completion and assert it exits with a non-zero status.
/// Returns (stdout, stderr) as Strings.
fn run_failure(args: &[&str]) -> (String, String) {
    let out = Command::new(binary())
        .args(args)
        .output()
        .expect("failed to invoke watch binary");
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    assert!(
        !out.status.success(),
        "command {:?} expected to fail but exited successfully\nstdout: {}\nstderr: {}",
        args,
        stdout,
        stderr
    );
    (stdout, stderr)
}

/// A `watch` process running in the background. Killed on drop.
struct Running {
    child: Child,
    lines: mpsc::Receiver<String>,
    seen: Vec<String>,
}

impl Running {
    fn start(args: &[&str]) -> Self {
        let mut child = Command::new(binary())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to invoke watch binary");
        let stdout = child.stdout.take().expect("stdout is piped");
        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { return };
                if tx.send(line).is_err() {
                    return;
                }
            }
        });
        Self {
            child,
            lines,
            seen: Vec::new(),
        }
    }

    /// Repeatedly write `file` until a stdout line satisfying `want` appears.
    fn poke_until(&mut self, file: &Path, want: impl Fn(&str) -> bool) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            fs::write(file, "changed").unwrap();
            while let Ok(line) = self.lines.recv_timeout(Duration::from_millis(200)) {
                self.seen.push(line.clone());
                if want(&line) {
                    return line;
                }
            }
        }
        panic!(
            "no matching output after writing {}\nseen: {:?}",
            file.display(),
            self.seen
        );
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// ---------------------------------------------------------------------------
// Startup behaviour
// ---------------------------------------------------------------------------

/// test_no_command_prints_usage: without a command, usage goes to stdout and the exit status is 0.
#[test]
fn test_no_command_prints_usage() {
    let stdout = run_success(&[]);
    assert!(
        stdout.contains("watch [-n] [-r] [-p <pattern>] [-d <dir>] cmd [cmd_args...]"),
        "usage line missing\nstdout: {}",
        stdout
    );
}

/// test_bad_pattern_is_fatal: a pattern that does not compile exits non-zero.
#[test]
fn test_bad_pattern_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap();
    let (_, stderr) = run_failure(&["-d", path, "-p", "(unclosed", "true"]);
    assert!(
        stderr.contains("invalid pattern"),
        "stderr should name the bad pattern\nstderr: {}",
        stderr
    );
}

/// test_bad_pattern_without_command_is_fatal: the pattern is checked before the usage fallback.
#[test]
fn test_bad_pattern_without_command_is_fatal() {
    let (stdout, stderr) = run_failure(&["-p", "("]);
    assert!(
        stderr.contains("invalid pattern"),
        "stderr should name the bad pattern\nstderr: {}",
        stderr
    );
    assert!(!stdout.contains("Usage"), "usage printed\nstdout: {}", stdout);
}

/// test_missing_directory_is_fatal: watching a directory that does not exist exits non-zero.
#[test]
fn test_missing_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let (_, stderr) = run_failure(&["-d", missing.to_str().unwrap(), "true"]);
    assert!(
        stderr.contains("does-not-exist"),
        "stderr should name the directory\nstderr: {}",
        stderr
    );
}

/// test_file_as_directory_is_fatal: `-d` pointing at a regular file exits non-zero.
#[test]
fn test_file_as_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, "x").unwrap();
    let (_, stderr) = run_failure(&["-d", file.to_str().unwrap(), "true"]);
    assert!(
        stderr.contains("not a directory"),
        "stderr should explain the problem\nstderr: {}",
        stderr
    );
}

// ---------------------------------------------------------------------------
// Watching
// ---------------------------------------------------------------------------

/// test_change_runs_command_with_filename: `-n` appends the absolute path of the changed file.
#[test]
fn test_change_runs_command_with_filename() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let mut watch = Running::start(&["-n", "-d", root.to_str().unwrap(), "echo", "changed:"]);

    let file = root.join("notes.txt");
    let line = watch.poke_until(&file, |l| l.starts_with("changed:"));
    assert_eq!(line, format!("changed: {}", file.display()));
}

/// test_pattern_filters_changes: only paths matching `-p` trigger the command.
#[test]
fn test_pattern_filters_changes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let mut watch = Running::start(&[
        "-n",
        "-p",
        r"\.go$",
        "-d",
        root.to_str().unwrap(),
        "echo",
        "go:",
    ]);

    fs::write(root.join("skip.txt"), "x").unwrap();
    let line = watch.poke_until(&root.join("main.go"), |l| l.starts_with("go:"));
    assert!(line.ends_with("main.go"), "line: {line}");
    assert!(
        !watch.seen.iter().any(|l| l.contains("skip.txt")),
        "filtered file triggered the command\nseen: {:?}",
        watch.seen
    );
}

/// test_recursive_watches_subdirectories: `-r` covers directories present at startup.
#[test]
fn test_recursive_watches_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    fs::create_dir_all(root.join("src/nested")).unwrap();
    let mut watch = Running::start(&["-r", "-n", "-d", root.to_str().unwrap(), "echo", "hit:"]);

    let file = root.join("src/nested/lib.rs");
    let line = watch.poke_until(&file, |l| l.starts_with("hit:"));
    assert_eq!(line, format!("hit: {}", file.display()));
}

/// test_failed_command_is_reported: a non-zero exit produces a diagnostic and watching continues.
#[test]
fn test_failed_command_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let mut watch = Running::start(&["-d", root.to_str().unwrap(), "echo", "ran;", "exit", "7"]);

    let file = root.join("a.txt");
    let line = watch.poke_until(&file, |l| l.starts_with("watch: "));
    assert_eq!(line, "watch: \"echo ran; exit 7\" failed: exit status 7");
    assert!(
        watch.seen.iter().any(|l| l == "ran"),
        "command output should precede the diagnostic\nseen: {:?}",
        watch.seen
    );

    // Still watching: a later change runs the command again.
    let runs_before = watch.seen.iter().filter(|l| *l == "ran").count();
    watch.poke_until(&file, |l| l.starts_with("watch: "));
    let runs_after = watch.seen.iter().filter(|l| *l == "ran").count();
    assert!(runs_after > runs_before, "seen: {:?}", watch.seen);
}

/// test_portable_backend: the notify-based backend reports the same changes.
#[test]
fn test_portable_backend() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let mut watch = Running::start(&[
        "--backend",
        "portable",
        "-d",
        root.to_str().unwrap(),
        "echo",
        "portable",
    ]);

    let line = watch.poke_until(&root.join("b.txt"), |l| l == "portable");
    assert_eq!(line, "portable");
}
