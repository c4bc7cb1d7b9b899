//! Process-backed generator
//!
//! Runs a resolved generator entry point as a child process inside the
//! staging directory. Options become `--key=value` flags, answers are fed to
//! the child as JSON (stdin and `STENCIL_ANSWERS`) so no prompt ever blocks.
//! Stderr lines starting with the fault marker are forwarded to the attempt's
//! fault channel even when the child exits successfully.

use crate::error::GenerationError;
use crate::generator::capability::{GenerationCapability, InvocationContext};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

/// Environment variable carrying the answers as a JSON object
pub const ANSWERS_ENV: &str = "STENCIL_ANSWERS";

/// Flag appended to every invocation; scaffolding never installs dependencies
pub const SKIP_INSTALL_FLAG: &str = "--skip-install";

/// Max number of output lines to include in error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Generator implemented by an executable on disk
#[derive(Debug, Clone)]
pub struct ProcessGenerator {
    name: String,
    entry: PathBuf,
    timeout: Duration,
    fault_marker: String,
}

impl ProcessGenerator {
    pub fn new(
        name: impl Into<String>,
        entry: impl Into<PathBuf>,
        timeout: Duration,
        fault_marker: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            timeout,
            fault_marker: fault_marker.into(),
        }
    }

    fn command(&self, ctx: &InvocationContext, answers: &str) -> Command {
        let mut command = Command::new(&self.entry);
        command
            .current_dir(&ctx.working_dir)
            .args(ctx.request.args())
            .args(
                ctx.request
                    .options()
                    .iter()
                    .map(|(key, value)| format!("--{}={}", key, value)),
            )
            .arg(SKIP_INSTALL_FLAG)
            .env(ANSWERS_ENV, answers)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl GenerationCapability for ProcessGenerator {
    async fn invoke(&self, ctx: InvocationContext) -> Result<(), GenerationError> {
        let answers = serde_json::to_string(ctx.request.answers())
            .map_err(|e| GenerationError::CapabilityFault(format!("encoding answers: {}", e)))?;

        debug!("Executing: {} in {}", self.entry.display(), ctx.working_dir.display());
        let mut child = self.command(&ctx, &answers).spawn().map_err(|e| {
            GenerationError::CapabilityFault(format!(
                "failed to start {}: {}",
                self.entry.display(),
                e
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                // Generators that never read stdin close the pipe early
                if let Err(e) = stdin.write_all(answers.as_bytes()).await {
                    debug!("Generator did not read answers from stdin: {}", e);
                }
            });
        }

        let marker = self.fault_marker.as_str();
        let faults = ctx.faults.clone();
        let name = self.name.as_str();
        let on_line = move |stream: OutputStream, line: &str| {
            debug!("[{}] {}", name, line);
            if stream == OutputStream::Stderr {
                if let Some(fault) = line.strip_prefix(marker) {
                    faults.report(fault.trim().to_string());
                }
            }
        };

        let run = async {
            let output = stream_child_output(&mut child, on_line).await;
            let status = child.wait().await;
            (output, status)
        };
        let outcome = tokio::time::timeout(self.timeout, run).await;

        let (output, status) = match outcome {
            Ok(result) => result,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    debug!("Failed to kill timed out generator {}: {}", self.name, e);
                }
                return Err(GenerationError::CapabilityFault(format!(
                    "{} timed out after {:?}",
                    self.name, self.timeout
                )));
            }
        };

        let status = status.map_err(|e| {
            GenerationError::CapabilityFault(format!("waiting for {}: {}", self.name, e))
        })?;

        if status.success() {
            Ok(())
        } else {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            Err(GenerationError::CapabilityFault(format!(
                "{} exited with {}:\n{}",
                self.name,
                code,
                error_tail(&output)
            )))
        }
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.name, self.entry.display())
    }
}

/// The useful tail of generator output for error diagnostics.
pub(crate) fn error_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_line` for each line.
///
/// Lines are split on raw bytes and decoded lossily, so invalid UTF-8 never
/// ends a stream early. Returns all collected output lines for error reporting.
pub(crate) async fn stream_child_output<F>(child: &mut Child, mut on_line: F) -> Vec<String>
where
    F: FnMut(OutputStream, &str),
{
    let mut stdout_reader = child.stdout.take().map(|s| BufReader::new(s).split(b'\n'));
    let mut stderr_reader = child.stderr.take().map(|s| BufReader::new(s).split(b'\n'));

    let mut all_output = Vec::new();
    let mut stdout_done = stdout_reader.is_none();
    let mut stderr_done = stderr_reader.is_none();

    while !stderr_done || !stdout_done {
        tokio::select! {
            segment = async { stderr_reader.as_mut()?.next_segment().await.ok().flatten() }, if !stderr_done => {
                match segment {
                    Some(raw) => {
                        let line = decode_line(&raw);
                        on_line(OutputStream::Stderr, &line);
                        all_output.push(line);
                    }
                    None => stderr_done = true,
                }
            }
            segment = async { stdout_reader.as_mut()?.next_segment().await.ok().flatten() }, if !stdout_done => {
                match segment {
                    Some(raw) => {
                        let line = decode_line(&raw);
                        on_line(OutputStream::Stdout, &line);
                        all_output.push(line);
                    }
                    None => stdout_done = true,
                }
            }
        }
    }

    all_output
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::generator::fault::fault_channel;
    use crate::request::GenerationRequest;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("run");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn generator(entry: PathBuf) -> ProcessGenerator {
        ProcessGenerator::new("test-gen", entry, Duration::from_secs(10), "STENCIL_FAULT:")
    }

    #[tokio::test]
    async fn passes_args_options_and_answers() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let entry = script(
            bin.path(),
            r#"echo "$@" > args.txt
echo "$STENCIL_ANSWERS" > answers.txt
cat > stdin.txt"#,
        );

        let request = GenerationRequest::new("test-gen")
            .with_arg("orders")
            .with_option("name", "orders")
            .with_answer("lang", "rust");
        let (faults, mut observer) = fault_channel();
        let ctx = InvocationContext {
            working_dir: work.path().to_path_buf(),
            request,
            faults,
        };

        generator(entry).invoke(ctx).await.unwrap();

        let args = std::fs::read_to_string(work.path().join("args.txt")).unwrap();
        assert_eq!(args.trim(), "orders --name=orders --skip-install");
        let answers = std::fs::read_to_string(work.path().join("answers.txt")).unwrap();
        assert_eq!(answers.trim(), r#"{"lang":"rust"}"#);
        let stdin = std::fs::read_to_string(work.path().join("stdin.txt")).unwrap();
        assert_eq!(stdin, r#"{"lang":"rust"}"#);
        assert!(observer.drain().is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_is_capability_fault() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let entry = script(bin.path(), "echo 'template missing' >&2\nexit 3");

        let (faults, _observer) = fault_channel();
        let ctx = InvocationContext {
            working_dir: work.path().to_path_buf(),
            request: GenerationRequest::new("test-gen"),
            faults,
        };

        let err = generator(entry).invoke(ctx).await.unwrap_err();
        match err {
            GenerationError::CapabilityFault(message) => {
                assert!(message.contains("exited with 3"));
                assert!(message.contains("template missing"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn marked_stderr_lines_reach_fault_channel() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let entry = script(bin.path(), "echo 'STENCIL_FAULT: ENOENT template.yml' >&2\nexit 0");

        let (faults, mut observer) = fault_channel();
        let ctx = InvocationContext {
            working_dir: work.path().to_path_buf(),
            request: GenerationRequest::new("test-gen"),
            faults,
        };

        generator(entry).invoke(ctx).await.unwrap();
        assert_eq!(observer.drain(), vec!["ENOENT template.yml"]);
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_hide_later_faults() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let entry = script(
            bin.path(),
            "printf 'caf\\351\\n' >&2\necho 'STENCIL_FAULT: boom' >&2\nexit 0",
        );

        let (faults, mut observer) = fault_channel();
        let ctx = InvocationContext {
            working_dir: work.path().to_path_buf(),
            request: GenerationRequest::new("test-gen"),
            faults,
        };

        generator(entry).invoke(ctx).await.unwrap();
        assert_eq!(observer.drain(), vec!["boom"]);
    }

    #[tokio::test]
    async fn invalid_utf8_stdout_keeps_draining() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let entry = script(
            bin.path(),
            "printf '\\377\\n'\nhead -c 300000 /dev/zero | tr '\\0' 'a'\necho\nexit 0",
        );

        let (faults, _observer) = fault_channel();
        let ctx = InvocationContext {
            working_dir: work.path().to_path_buf(),
            request: GenerationRequest::new("test-gen"),
            faults,
        };

        let chatty = ProcessGenerator::new("chatty", entry, Duration::from_secs(5), "STENCIL_FAULT:");
        chatty.invoke(ctx).await.unwrap();
    }

    #[test]
    fn decode_line_is_lossy_and_trims_cr() {
        assert_eq!(decode_line(b"ok\r"), "ok");
        assert_eq!(decode_line(b"caf\xe9"), "caf\u{fffd}");
    }

    #[tokio::test]
    async fn slow_generator_times_out() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let entry = script(bin.path(), "sleep 5");

        let (faults, _observer) = fault_channel();
        let ctx = InvocationContext {
            working_dir: work.path().to_path_buf(),
            request: GenerationRequest::new("test-gen"),
            faults,
        };

        let slow = ProcessGenerator::new("slow", entry, Duration::from_millis(200), "STENCIL_FAULT:");
        let err = slow.invoke(ctx).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn error_tail_keeps_last_lines() {
        let lines: Vec<String> = (0..80).map(|i| i.to_string()).collect();
        let tail = error_tail(&lines);
        assert!(tail.starts_with("30\n"));
        assert!(tail.ends_with("79"));
    }
}
