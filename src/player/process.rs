//! Player process detection and spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use crate::protocol::BackendKind;

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("{0} executable not found")]
  NotFound(BackendKind),
  #[error("Failed to spawn player: {0}")]
  SpawnFailed(#[from] std::io::Error),
}

/// Find the player executable in common locations.
pub fn find_player(kind: BackendKind) -> Option<PathBuf> {
  let name = kind.binary_name();

  // Check PATH first
  if let Ok(path) = which::which(name) {
    return Some(path);
  }

  common_paths(kind)
    .into_iter()
    .map(PathBuf::from)
    .find(|path| path.exists())
}

#[cfg(windows)]
fn common_paths(kind: BackendKind) -> Vec<String> {
  let name = kind.binary_name();
  vec![
    format!(r"C:\Program Files\{0}\{0}.exe", name),
    format!(r"C:\Program Files (x86)\{0}\{0}.exe", name),
    format!(r"C:\{0}\{0}.exe", name),
  ]
}

#[cfg(target_os = "macos")]
fn common_paths(kind: BackendKind) -> Vec<String> {
  let name = kind.binary_name();
  vec![
    format!("/usr/local/bin/{}", name),
    format!("/opt/homebrew/bin/{}", name),
    format!("/opt/local/bin/{}", name),
    format!("/Applications/{0}.app/Contents/MacOS/{0}", name),
  ]
}

#[cfg(not(any(windows, target_os = "macos")))]
fn common_paths(kind: BackendKind) -> Vec<String> {
  let name = kind.binary_name();
  vec![format!("/usr/bin/{}", name), format!("/usr/local/bin/{}", name)]
}

/// Configured path if given, otherwise autodetect.
pub fn resolve_binary(kind: BackendKind, configured: Option<&Path>) -> Result<PathBuf, ProcessError> {
  configured
    .map(Path::to_path_buf)
    .or_else(|| find_player(kind))
    .ok_or(ProcessError::NotFound(kind))
}

/// One output stream of a spawned player.
pub type PlayerOutput = Box<dyn AsyncRead + Send + Unpin>;

/// Spawn the player with stdin piped.
///
/// On Unix stdout and stderr share one pipe, so lines arrive in the order the
/// player wrote them. Elsewhere the two streams are returned separately.
///
/// The process is started in `working_dir` when it exists, so that relative
/// screenshot names land there.
pub fn spawn_player(
  program: &Path,
  args: &[String],
  working_dir: Option<&Path>,
) -> Result<(Child, Vec<PlayerOutput>), ProcessError> {
  log::info!("Spawning player: {:?}", program);
  log::debug!("Player args: {:?}", args);

  let mut cmd = Command::new(program);
  cmd.args(args);
  if let Some(dir) = working_dir.filter(|dir| dir.is_dir()) {
    cmd.current_dir(dir);
  }
  cmd.stdin(Stdio::piped()).kill_on_drop(true);

  spawn_with_output(cmd)
}

#[cfg(unix)]
fn spawn_with_output(mut cmd: Command) -> Result<(Child, Vec<PlayerOutput>), ProcessError> {
  let (tx, rx) = tokio::net::unix::pipe::pipe()?;
  let stdout = tx.into_blocking_fd()?;
  let stderr = stdout.try_clone()?;
  let child = cmd.stdout(stdout).stderr(stderr).spawn()?;
  // the write ends live on in `cmd` until it drops here
  drop(cmd);
  Ok((child, vec![Box::new(rx)]))
}

#[cfg(not(unix))]
fn spawn_with_output(mut cmd: Command) -> Result<(Child, Vec<PlayerOutput>), ProcessError> {
  let mut child = cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
  let mut outputs: Vec<PlayerOutput> = Vec::new();
  if let Some(stdout) = child.stdout.take() {
    outputs.push(Box::new(stdout));
  }
  if let Some(stderr) = child.stderr.take() {
    outputs.push(Box::new(stderr));
  }
  Ok((child, outputs))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_configured_path_wins() {
    let path = resolve_binary(BackendKind::Mpv, Some(Path::new("/opt/mpv/bin/mpv"))).unwrap();
    assert_eq!(path, PathBuf::from("/opt/mpv/bin/mpv"));
  }

  #[test]
  fn test_common_paths_use_binary_name() {
    assert!(common_paths(BackendKind::Mplayer)
      .iter()
      .all(|path| path.contains("mplayer")));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_stdout_and_stderr_keep_write_order() {
    use tokio::io::AsyncReadExt;

    let script = "echo one; echo two >&2; echo three; echo four >&2";
    let args = vec!["-c".to_string(), script.to_string()];
    let (mut child, mut outputs) = spawn_player(Path::new("/bin/sh"), &args, None).unwrap();
    assert_eq!(outputs.len(), 1);

    let mut text = String::new();
    outputs[0].read_to_string(&mut text).await.unwrap();
    assert_eq!(text, "one\ntwo\nthree\nfour\n");
    assert!(child.wait().await.unwrap().success());
  }

  #[tokio::test]
  async fn test_spawn_missing_binary_fails() {
    let result = spawn_player(Path::new("/nonexistent/slavectl-player"), &[], None);
    assert!(matches!(result, Err(ProcessError::SpawnFailed(_))));
  }
}
