// Copyright 2025 Chisomo Makombo Sakala
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Writes extracted code to a temp file, spawns the target language's
//! CLI as an opaque child process, and captures its output under a
//! timeout (C5). Has no knowledge of language internals: the child is
//! treated purely as an `{argv, env, stdin} -> {exit, stdout, stderr}`
//! function.

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::BufReader;
use tokio::process::Command;
use tracing::Instrument;

use crate::error::SandboxError;
use crate::model::Capability;

/// The executable (and canonical source-file name) used to run one
/// target language, resolved once at startup from a manifest or CLI
/// override.
#[derive(Debug, Clone)]
pub struct LanguageRunner {
  pub command: PathBuf,
  pub base_args: Vec<String>,
  pub source_filename: String,
}

/// Everything the sandbox needs for one attempt's execution.
pub struct SandboxRequest<'a> {
  pub code: &'a str,
  pub runner: &'a LanguageRunner,
  pub entrypoint: &'a str,
  pub capabilities: &'a BTreeSet<Capability>,
  pub stdin: Option<&'a str>,
  pub timeout: Duration,
}

/// The observable result of one sandbox invocation.
#[derive(Debug, Clone)]
pub struct SandboxOutput {
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub duration_ms: u64,
  pub timed_out: bool,
}

/// Runs `code` to completion or timeout, guaranteeing the temp directory
/// is gone by the time this returns. Cleanup happens via `TempDir`'s
/// `Drop`, not a manual best-effort delete, so it runs on every exit path
/// including an early `?` return or a panic unwind.
pub async fn run_sandboxed(request: SandboxRequest<'_>) -> Result<SandboxOutput, SandboxError> {
  let temp_dir = tempfile::tempdir().map_err(SandboxError::TempDir)?;
  let source_path = temp_dir.path().join(&request.runner.source_filename);

  std::fs::write(&source_path, request.code).map_err(|e| SandboxError::WriteSource(source_path.clone(), e))?;

  let result = spawn_and_capture(&source_path, &request).await;

  // `temp_dir` drops here regardless of whether `spawn_and_capture`
  // returned `Ok` or `Err`, removing the directory from disk.
  result
}

async fn spawn_and_capture(source_path: &Path, request: &SandboxRequest<'_>) -> Result<SandboxOutput, SandboxError> {
  let mut cmd = Command::new(&request.runner.command);
  cmd.args(&request.runner.base_args).arg(source_path).arg(format!("--entrypoint={}", request.entrypoint));

  for capability in request.capabilities {
    cmd.arg(format!("--cap={capability}"));
  }

  cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

  if request.stdin.is_some() {
    cmd.stdin(Stdio::piped());
  } else {
    cmd.stdin(Stdio::null());
  }

  tracing::debug!(cmd = ?cmd, "spawning sandboxed child");
  let started = Instant::now();
  let mut child = cmd.spawn().map_err(SandboxError::Spawn)?;

  if let Some(stdin_text) = request.stdin {
    use tokio::io::AsyncWriteExt;
    if let Some(mut stdin) = child.stdin.take() {
      let _ = stdin.write_all(stdin_text.as_bytes()).await;
    }
  }

  let stdout = child.stdout.take().ok_or(SandboxError::PipeStdout)?;
  let stderr = child.stderr.take().ok_or(SandboxError::PipeStderr)?;

  let stdout_task = tokio::spawn(read_all(stdout).instrument(tracing::info_span!("stdout_handler")));
  let stderr_task = tokio::spawn(read_all(stderr).instrument(tracing::info_span!("stderr_handler")));

  let wait_result = tokio::time::timeout(request.timeout, child.wait()).await;

  let (exit_code, timed_out) = match wait_result {
    Ok(status) => {
      let status = status.map_err(SandboxError::WaitChild)?;
      (status.code(), false)
    }
    Err(_elapsed) => {
      tracing::warn!("sandboxed child exceeded timeout, terminating");
      let _ = child.start_kill();
      let _ = child.wait().await;
      (None, true)
    }
  };

  let stdout = stdout_task.await.map_err(SandboxError::StdoutTask)??;
  let stderr = stderr_task.await.map_err(SandboxError::StderrTask)??;

  Ok(SandboxOutput {
    exit_code,
    stdout,
    stderr,
    duration_ms: started.elapsed().as_millis() as u64,
    timed_out,
  })
}

async fn read_all<R: AsyncRead + Unpin>(stream: R) -> Result<String, SandboxError> {
  let mut reader = BufReader::new(stream).lines();
  let mut out = String::new();
  while let Some(line) = reader.next_line().await.map_err(SandboxError::ReadStdout)? {
    out.push_str(&line);
    out.push('\n');
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn echo_runner() -> LanguageRunner {
    LanguageRunner {
      command: PathBuf::from("/bin/sh"),
      base_args: vec!["-c".to_string(), "cat $0; echo done-marker 1>&2".to_string()],
      source_filename: "main.txt".to_string(),
    }
  }

  #[tokio::test]
  async fn captures_stdout_stderr_and_exit_code() {
    let runner = echo_runner();
    let request = SandboxRequest {
      code: "hello-sandbox",
      runner: &runner,
      entrypoint: "main",
      capabilities: &BTreeSet::new(),
      stdin: None,
      timeout: Duration::from_secs(5),
    };

    let output = run_sandboxed(request).await.unwrap();
    assert_eq!(output.exit_code, Some(0));
    assert!(output.stdout.contains("hello-sandbox"));
    assert!(output.stderr.contains("done-marker"));
    assert!(!output.timed_out);
  }

  #[tokio::test]
  async fn temp_directory_is_gone_after_run() {
    let runner = LanguageRunner {
      command: PathBuf::from("/bin/sh"),
      base_args: vec!["-c".to_string(), "dirname $0 > /tmp/evalharness_test_dirpath".to_string()],
      source_filename: "main.txt".to_string(),
    };
    let request = SandboxRequest {
      code: "x",
      runner: &runner,
      entrypoint: "main",
      capabilities: &BTreeSet::new(),
      stdin: None,
      timeout: Duration::from_secs(5),
    };

    run_sandboxed(request).await.unwrap();

    let recorded = std::fs::read_to_string("/tmp/evalharness_test_dirpath").unwrap();
    let dir = recorded.trim();
    assert!(!Path::new(dir).exists());
    let _ = std::fs::remove_file("/tmp/evalharness_test_dirpath");
  }

  #[tokio::test]
  async fn timeout_is_reported_and_exit_code_absent() {
    let runner = LanguageRunner {
      command: PathBuf::from("/bin/sh"),
      base_args: vec!["-c".to_string(), "sleep 5".to_string()],
      source_filename: "main.txt".to_string(),
    };
    let request = SandboxRequest {
      code: "x",
      runner: &runner,
      entrypoint: "main",
      capabilities: &BTreeSet::new(),
      stdin: None,
      timeout: Duration::from_millis(50),
    };

    let output = run_sandboxed(request).await.unwrap();
    assert!(output.timed_out);
    assert_eq!(output.exit_code, None);
  }
}
