//! External program invocation and dependency checks

use crate::config::{EditorKind, ToolPaths};
use crate::error::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Run a program to completion, capturing stdout and stderr.
///
/// Only spawn failures are errors here; callers decide what a non-zero exit
/// status means.
pub async fn run<I, S>(program: &Path, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args = collect_args(args);
    log::debug!("running {}", label(program, &args));

    Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| spawn_error(program, e))
}

/// Run a program and fail unless it exits successfully. Returns stdout.
pub async fn run_checked<I, S>(program: &Path, args: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args = collect_args(args);
    let output = run(program, &args).await?;
    ensure_success(&label(program, &args), output).map(|o| o.stdout)
}

/// Run a program with `input` written to its stdin.
pub async fn run_with_input<I, S>(program: &Path, args: I, input: &[u8]) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args = collect_args(args);
    log::debug!("running {} ({} bytes on stdin)", label(program, &args), input.len());

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(input).await {
            Ok(()) => {}
            // The program exited without reading everything; its status tells the rest
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(child.wait_with_output().await?)
}

/// Turn a non-zero exit into [`Error::CommandExecution`].
pub fn ensure_success(label: &str, output: Output) -> Result<Output> {
    if output.status.success() {
        return Ok(output);
    }

    Err(Error::CommandExecution(format!(
        "{label} failed ({}): {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    )))
}

/// Short description of an invocation for logs and errors.
///
/// Only the program and its subcommand are included; later arguments may
/// carry passwords.
pub fn label(program: &Path, args: &[OsString]) -> String {
    match args.first() {
        Some(first) => format!("{} {}", program.display(), first.to_string_lossy()),
        None => program.display().to_string(),
    }
}

/// Check that every program the run needs can be found
///
/// `plutil` is only required by the `plutil` editor.
pub fn check_dependencies(tools: &ToolPaths, editor: EditorKind) -> Result<()> {
    let mut required = vec![
        (&tools.security, "keychain and CMS operations"),
        (&tools.openssl, "reading the PKCS#12 bundle"),
    ];
    if editor == EditorKind::Plutil {
        required.push((&tools.plutil, "editing provisioning profiles"));
    }

    for (program, purpose) in required {
        match which::which(program) {
            Ok(found) => log::debug!("found {} at {}", program.display(), found.display()),
            Err(_) => {
                return Err(Error::MissingDependency(format!(
                    "'{}' not found in PATH (required for {purpose})",
                    program.display()
                )));
            }
        }
    }

    Ok(())
}

fn collect_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    args.into_iter().map(|a| a.as_ref().to_os_string()).collect()
}

fn spawn_error(program: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::MissingDependency(format!("{} command not found", program.display()))
    } else {
        Error::CommandExecution(format!("Failed to execute {}: {e}", program.display()))
    }
}
