//! Child-process helpers shared by script tools and run_cmd.

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

const READ_CHUNK: usize = 4096;

/// A command line run through the platform shell.
pub(crate) fn shell(command_line: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd.exe");
        cmd.arg("/c").arg(command_line);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }
}

/// Decode console output: UTF-8 when valid, otherwise the platform's
/// legacy console encoding.
pub fn decode_output(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => decode_legacy(bytes),
    }
}

#[cfg(windows)]
fn decode_legacy(bytes: &[u8]) -> String {
    let (text, _, _) = encoding_rs::GBK.decode(bytes);
    text.into_owned()
}

#[cfg(not(windows))]
fn decode_legacy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Run `cmd` to completion and return stdout and stderr as one decoded
/// stream, in the order the child wrote them.
pub(crate) async fn combined_output(mut cmd: Command) -> std::io::Result<(String, ExitStatus)> {
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let mut combined = Vec::new();
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];
    while stdout.is_some() || stderr.is_some() {
        let (from_stdout, read) = tokio::select! {
            n = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => (true, n?),
            n = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => (false, n?),
        };
        match (from_stdout, read) {
            (true, 0) => stdout = None,
            (false, 0) => stderr = None,
            (true, n) => combined.extend_from_slice(&out_buf[..n]),
            (false, n) => combined.extend_from_slice(&err_buf[..n]),
        }
    }

    let status = child.wait().await?;
    Ok((decode_output(&combined), status))
}

async fn read_chunk<R: AsyncRead + Unpin>(
    pipe: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match pipe {
        Some(pipe) => pipe.read(buf).await,
        None => Ok(0),
    }
}
