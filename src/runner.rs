use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Render a command line for logs and errors
fn describe(cmd: &str, args: &[&str]) -> String {
    if args.is_empty() {
        cmd.to_string()
    } else {
        format!("{} {}", cmd, args.join(" "))
    }
}

/// Run a command and capture output
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    log::trace!("running: {}", describe(cmd, args));
    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {}", describe(cmd, args)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} failed: {}", describe(cmd, args), stderr.trim())
    }
}

/// Run a command, discarding stdout
pub fn run_checked(cmd: &str, args: &[&str]) -> Result<()> {
    run_capture(cmd, args).map(|_| ())
}

/// Run a command, killing it once `timeout` passes
pub fn run_with_timeout(cmd: &str, args: &[&str], timeout: Duration) -> Result<()> {
    log::trace!("running ({}s): {}", timeout.as_secs(), describe(cmd, args));
    let mut child = Command::new(cmd)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute: {}", describe(cmd, args)))?;

    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            break;
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            child.wait().ok();
            anyhow::bail!(
                "{} timed out after {}s",
                describe(cmd, args),
                timeout.as_secs()
            );
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for {}", describe(cmd, args)))?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} failed: {}", describe(cmd, args), stderr.trim())
    }
}

/// Run a command with `input` on stdin
pub fn run_with_input(cmd: &str, args: &[&str], input: &str) -> Result<()> {
    log::trace!("running with stdin: {}", describe(cmd, args));
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute: {}", describe(cmd, args)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .with_context(|| format!("Failed to write stdin of {}", cmd))?;
    }

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for {}", describe(cmd, args)))?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} failed: {}", describe(cmd, args), stderr.trim())
    }
}
