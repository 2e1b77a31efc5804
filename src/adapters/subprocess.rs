//! Piped subprocess execution shared by the image tools.

use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Run `program`, feeding `input` on stdin while stdout and stderr drain.
///
/// The write and the wait share one deadline; on expiry the child is killed.
/// A child that exits without reading all of stdin is not an error here,
/// its exit status decides.
pub async fn run_piped(
    label: &str,
    program: &str,
    args: &[String],
    input: &[u8],
    limit: Duration,
) -> Result<Output> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn {}", label))?;

    let stdin = child.stdin.take();
    let feed = async move {
        let Some(mut stdin) = stdin else {
            return Ok(());
        };
        match stdin.write_all(input).await {
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!(label, "Child closed stdin early");
                Ok(())
            }
            other => other,
        }
        // stdin drops here so the child sees EOF
    };

    let (written, output) = timeout(limit, async { tokio::join!(feed, child.wait_with_output()) })
        .await
        .with_context(|| format!("{} timed out after {:?}", label, limit))?;

    let output = output.with_context(|| format!("Failed to wait for {}", label))?;
    written.with_context(|| format!("Failed to write input to {}", label))?;
    Ok(output)
}
