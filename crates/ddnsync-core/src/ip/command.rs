//! Command address source
//!
//! Runs a user command through the platform shell and scans its output.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::cancel::CancelToken;
use crate::config::DEFAULT_COMMAND_TIMEOUT_SECS;
use crate::ip::extract;
use crate::traits::IpFamily;
use crate::{Error, Result};

/// Run `command` and return the first address of `family` in its output
///
/// Stdout is scanned before stderr. The child is killed when the timeout
/// expires or `cancel` fires.
pub async fn detect(
    family: IpFamily,
    command: &str,
    env: &BTreeMap<String, String>,
    timeout_secs: Option<u64>,
    cancel: &CancelToken,
) -> Result<IpAddr> {
    let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS));

    let child = shell(command)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::ip_detect(format!("Failed to spawn {command:?}: {e}")))?;

    let output = cancel
        .guard(async {
            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(output) => output.map_err(Error::from),
                Err(_) => Err(Error::ip_detect(format!(
                    "Command {command:?} timed out after {}s",
                    timeout.as_secs()
                ))),
            }
        })
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(Error::ip_detect(format!(
            "Command {command:?} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    extract::first_ip(&stdout, family)
        .or_else(|| extract::first_ip(&stderr, family))
        .ok_or_else(|| {
            Error::ip_detect(format!(
                "No {family} address in output of {command:?}"
            ))
        })
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
