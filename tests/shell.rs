//! End-to-end tests driving the `pipesh` binary.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

fn pipesh() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pipesh"))
}

fn run_line(line: &str) -> Output {
    pipesh()
        .args(["-c", line])
        .output()
        .expect("failed to start pipesh")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if path.exists() {
            return true;
        }
        sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn single_command() {
    let output = run_line("echo hello world");
    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "hello world\n");
}

#[test]
fn two_stage_pipeline() {
    let output = run_line("echo hello|tr a-z A-Z");
    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "HELLO\n");
}

#[test]
fn three_stage_pipeline_with_redirections() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let out = dir.path().join("out.txt");
    fs::write(&input, "pear\napple\npear\nfig\n").unwrap();

    let line = format!(
        "sort < {} | uniq | head -n 2 > {}",
        path_str(&input),
        path_str(&out)
    );
    let output = run_line(&line);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output), "");
    assert_eq!(fs::read_to_string(&out).unwrap(), "apple\nfig\n");
}

#[test]
fn output_redirect_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("created.txt");
    let output = run_line(&format!("echo redirected > {}", path_str(&out)));
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&out).unwrap(), "redirected\n");
}

#[test]
fn status_of_last_stage_is_reported() {
    assert_eq!(run_line("true | false").status.code(), Some(1));
    assert_eq!(run_line("false | true").status.code(), Some(0));
}

#[test]
fn syntax_errors_are_reported() {
    for line in ["echo x >", "cmd & extra", "| wc", "ls |", "a | b < in", "a > out | b"] {
        let output = run_line(line);
        assert_eq!(output.status.code(), Some(2), "line: {line}");
        assert!(stderr_of(&output).contains("Parse error"), "line: {line}");
    }
}

#[test]
fn unknown_program_fails_with_diagnostic() {
    let output = run_line("definitely-not-a-real-program-4711 --flag");
    assert_eq!(output.status.code(), Some(127));
    assert!(stderr_of(&output)
        .contains("Unknown or malformatted command: definitely-not-a-real-program-4711"));
}

#[test]
fn missing_input_file_fails_only_that_pipeline() {
    let output = run_line("cat < /nonexistent/pipesh/input");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("Unable to open file /nonexistent/pipesh/input"));
}

#[test]
fn help_builtin_prints_usage() {
    let output = run_line("help");
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("cd [dir]"));
}

#[test]
fn interactive_session_runs_builtins_and_stops_at_exit() {
    let dir = tempfile::tempdir().unwrap();
    let dir_path: PathBuf = fs::canonicalize(dir.path()).unwrap();
    fs::create_dir(dir_path.join("sub")).unwrap();

    let script = format!(
        "cd {}\n\ncd sub\ncd ..\ncd nonexistent-dir\npwd > pwd.txt\necho x >\nexit\necho after-exit > after.txt\n",
        path_str(&dir_path)
    );

    let mut child = pipesh()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(script.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let stderr = stderr_of(&output);
    assert!(stderr.contains("Unknown path: "), "stderr: {stderr}");
    assert!(stderr.contains("Parse error"), "stderr: {stderr}");
    assert_eq!(
        fs::read_to_string(dir_path.join("pwd.txt")).unwrap(),
        format!("{}\n", dir_path.display())
    );
    assert!(!dir_path.join("after.txt").exists());
}

#[test]
fn background_jobs_survive_foreground_interrupt() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("job.sh");
    fs::write(&script, "sleep 1\necho done > \"$1\"\n").unwrap();
    let first = dir.path().join("first.done");
    let second = dir.path().join("second.done");

    let mut child = pipesh()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    writeln!(stdin, "sh {} {} &", path_str(&script), path_str(&first)).unwrap();
    writeln!(stdin, "sh {} {} &", path_str(&script), path_str(&second)).unwrap();
    stdin.flush().unwrap();

    // Give the shell time to detach both jobs, then interrupt its process group
    // the way the terminal would.
    sleep(Duration::from_millis(400));
    killpg(Pid::from_raw(child.id() as i32), Signal::SIGINT).unwrap();

    writeln!(stdin, "exit").unwrap();
    drop(stdin);
    let status = child.wait().unwrap();
    assert!(status.success(), "the shell itself must survive SIGINT");

    assert!(wait_for_file(&first, Duration::from_secs(5)));
    assert!(wait_for_file(&second, Duration::from_secs(5)));
}

#[test]
fn diagnostics_are_printed_once_at_default_level() {
    let output = run_line("ls |");
    assert_eq!(output.status.code(), Some(2));
    let stderr = stderr_of(&output);
    assert_eq!(stderr.matches("Incomplete command line").count(), 1, "stderr: {stderr}");
    assert!(!stderr.contains("WARN"), "stderr: {stderr}");

    let output = run_line("cd /nonexistent/pipesh/dir");
    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr_of(&output);
    assert_eq!(stderr.matches("Unknown path: ").count(), 1, "stderr: {stderr}");
    assert!(!stderr.contains("WARN"), "stderr: {stderr}");
}

#[test]
fn history_and_log_file_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("history");
    let log = dir.path().join("pipesh.log");

    let mut child = pipesh()
        .args(["--history", path_str(&history)])
        .args(["--log-file", path_str(&log)])
        .args(["--log-level", "debug"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"echo hi\nexit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    assert!(stdout_of(&output).contains("hi\n"));

    let saved = fs::read_to_string(&history).unwrap();
    let entries: Vec<&str> = saved.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(entries, ["echo hi", "exit"]);

    let logged = fs::read_to_string(&log).unwrap();
    assert!(logged.contains("parsed 1 stage(s)"), "log: {logged}");
    assert!(logged.contains("spawned pid"), "log: {logged}");
    // Everything went to the file, nothing to the terminal.
    assert!(!stderr_of(&output).contains("DEBUG"));
}
