//! One playback session: a player process and the dispatcher reading it.
//!
//! A dispatch task owns the line stream and the timers. Actions from the
//! shell are encoded under the lock and then written by the same task, so
//! command order matches action order.

use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::Child;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ipc::PlayerIpc;
use super::process::{self, ProcessError};
use crate::config::{ConfigError, PlayerConfig};
use crate::media::{MediaSource, MediaState};
use crate::protocol::{Action, BackendKind, Dispatcher, Notification, Phase, ProcessExit};

/// Lines still buffered when the process exits are read for this long.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum SessionError {
  #[error(transparent)]
  Process(#[from] ProcessError),
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("Player {0} is not piped")]
  MissingPipe(&'static str),
  #[error("Session is not running")]
  NotRunning,
}

/// State shared between the session handle and its tasks.
struct Shared {
  dispatcher: Mutex<Dispatcher>,
  ipc: PlayerIpc,
  notify_tx: Sender<Notification>,
  /// Wakes the dispatch task after an action was queued.
  wake: Notify,
  /// Cancelled to kill the process.
  kill: CancellationToken,
}

/// Handle to a running player.
pub struct PlayerSession {
  id: Uuid,
  kind: BackendKind,
  shared: Arc<Shared>,
  /// Cancelled once `SessionEnded` was delivered.
  done: CancellationToken,
  notifications: Receiver<Notification>,
  quit_timeout: Duration,
}

impl PlayerSession {
  /// Launch the configured player for `source`.
  pub fn start(config: &PlayerConfig, source: &MediaSource) -> Result<Self, SessionError> {
    config.validate()?;
    let kind = config.backend;
    let launch = config.launch_options();
    let dispatcher = Dispatcher::new(kind.create(&launch), source, &config.dispatch_options());
    let args = dispatcher.startup_arguments(source, &launch);
    let program = process::resolve_binary(kind, config.binary_path().as_deref())?;
    Self::start_with(&program, &args, dispatcher, config)
  }

  /// Launch `program` and drive `dispatcher` with its output.
  pub fn start_with(
    program: &Path,
    args: &[String],
    dispatcher: Dispatcher,
    config: &PlayerConfig,
  ) -> Result<Self, SessionError> {
    let kind = dispatcher.backend_kind();
    let (mut child, outputs) = process::spawn_player(program, args, config.screenshot_dir.as_deref())?;
    let stdin = child.stdin.take().ok_or(SessionError::MissingPipe("stdin"))?;

    let ipc = PlayerIpc::setup(stdin, outputs);
    let lines = ipc.lines();
    let (notify_tx, notify_rx) = async_channel::unbounded();
    let kill = CancellationToken::new();
    let done = CancellationToken::new();

    let shared = Arc::new(Shared {
      dispatcher: Mutex::new(dispatcher),
      ipc,
      notify_tx,
      wake: Notify::new(),
      kill: kill.clone(),
    });

    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(Self::exit_watcher(child, kill, exit_tx));

    let loop_shared = shared.clone();
    let loop_done = done.clone();
    let startup_timeout = config.startup_timeout();
    let quit_timeout = config.quit_timeout();
    tokio::spawn(async move {
      Self::dispatch_loop(loop_shared, lines, exit_rx, startup_timeout, quit_timeout).await;
      loop_done.cancel();
    });

    let id = Uuid::new_v4();
    log::info!("Session {} started with {}", id, kind);
    Ok(Self {
      id,
      kind,
      shared,
      done,
      notifications: notify_rx,
      quit_timeout: config.quit_timeout(),
    })
  }

  async fn exit_watcher(mut child: Child, kill: CancellationToken, exit_tx: oneshot::Sender<ProcessExit>) {
    let exit = tokio::select! {
      status = child.wait() => match status {
        Ok(status) => exit_from_status(status),
        Err(e) => {
          log::error!("Failed to wait for player: {}", e);
          ProcessExit::crashed(None)
        }
      },
      _ = kill.cancelled() => {
        log::warn!("Killing player process");
        if let Err(e) = child.kill().await {
          log::error!("Failed to kill player: {}", e);
        }
        ProcessExit::killed()
      }
    };
    log::info!("Player exited: {:?}", exit);
    let _ = exit_tx.send(exit);
  }

  async fn dispatch_loop(
    shared: Arc<Shared>,
    lines: Receiver<String>,
    mut exit_rx: oneshot::Receiver<ProcessExit>,
    startup_timeout: Duration,
    quit_timeout: Duration,
  ) {
    let startup_deadline = Instant::now() + startup_timeout;
    let mut seen_output = false;

    let exit = loop {
      let backend_deadline = shared.dispatcher.lock().next_deadline();
      let startup = (!seen_output).then_some(startup_deadline);
      let wake_at = backend_deadline.into_iter().chain(startup).min();
      let timer = async move {
        match wake_at {
          Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
          None => std::future::pending::<()>().await,
        }
      };

      tokio::select! {
        line = lines.recv() => match line {
          Ok(line) => {
            seen_output = true;
            shared.dispatcher.lock().process_line(&line);
          }
          Err(_) => {
            log::debug!("Player output closed");
            break Self::reap(&shared, exit_rx, quit_timeout).await;
          }
        },
        exit = &mut exit_rx => {
          let exit = exit.unwrap_or_else(|_| ProcessExit::crashed(None));
          Self::drain(&shared, &lines).await;
          break exit;
        }
        _ = shared.wake.notified() => {}
        _ = timer => {
          let now = Instant::now();
          if !seen_output && now >= startup_deadline {
            log::error!("No output from player within {:?}", startup_timeout);
            shared.dispatcher.lock().transport_failed("no output from player");
            shared.kill.cancel();
            seen_output = true;
          }
          shared.dispatcher.lock().on_timer(now);
        }
      }

      Self::pump(&shared).await;
    };

    let notifications = {
      let mut dispatcher = shared.dispatcher.lock();
      dispatcher.finish(exit);
      let unsent = dispatcher.take_commands();
      if !unsent.is_empty() {
        log::debug!("Dropping {} commands after exit", unsent.len());
      }
      dispatcher.take_notifications()
    };
    Self::forward(&shared, notifications).await;
    shared.ipc.close();
  }

  /// Wait for a process whose output has ended, killing it once
  /// `quit_timeout` has passed.
  async fn reap(
    shared: &Shared,
    mut exit_rx: oneshot::Receiver<ProcessExit>,
    quit_timeout: Duration,
  ) -> ProcessExit {
    let exit = match tokio::time::timeout(quit_timeout, &mut exit_rx).await {
      Ok(exit) => exit,
      Err(_) => {
        log::warn!("Player still running {:?} after its output closed", quit_timeout);
        shared.kill.cancel();
        exit_rx.await
      }
    };
    exit.unwrap_or_else(|_| ProcessExit::crashed(None))
  }

  /// Process lines that were still in flight when the process exited.
  async fn drain(shared: &Shared, lines: &Receiver<String>) {
    while let Ok(Ok(line)) = tokio::time::timeout(DRAIN_GRACE, lines.recv()).await {
      shared.dispatcher.lock().process_line(&line);
    }
  }

  /// Write queued commands and deliver ready notifications.
  async fn pump(shared: &Shared) {
    let (commands, notifications) = {
      let mut dispatcher = shared.dispatcher.lock();
      (dispatcher.take_commands(), dispatcher.take_notifications())
    };

    for command in commands {
      if let Err(e) = shared.ipc.send(command).await {
        log::error!("Failed to send command to player: {}", e);
        shared.dispatcher.lock().transport_failed(e.to_string());
        shared.kill.cancel();
        break;
      }
    }
    Self::forward(shared, notifications).await;
  }

  async fn forward(shared: &Shared, notifications: Vec<Notification>) {
    for notification in notifications {
      log::debug!("Notification: {:?}", notification);
      if shared.notify_tx.send(notification).await.is_err() {
        break;
      }
    }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn kind(&self) -> BackendKind {
    self.kind
  }

  /// Copy of the current media state.
  pub fn snapshot(&self) -> MediaState {
    self.shared.dispatcher.lock().media().clone()
  }

  pub fn phase(&self) -> Phase {
    self.shared.dispatcher.lock().phase()
  }

  /// Notifications in order, ending with `SessionEnded`.
  pub fn notifications(&self) -> Receiver<Notification> {
    self.notifications.clone()
  }

  pub fn is_running(&self) -> bool {
    !self.done.is_cancelled()
  }

  /// Queue an action for the player.
  pub fn send(&self, action: Action) -> Result<(), SessionError> {
    if !self.is_running() {
      return Err(SessionError::NotRunning);
    }
    self.shared.dispatcher.lock().command(action);
    self.shared.wake.notify_one();
    Ok(())
  }

  /// Wait until the session has ended.
  pub async fn wait(&self) {
    self.done.cancelled().await;
  }

  /// Ask the player to quit, killing it if it does not within the quit
  /// timeout.
  pub async fn stop(&self) {
    if !self.is_running() {
      return;
    }
    log::info!("Stopping session {}", self.id);
    self.shared.dispatcher.lock().command(Action::Quit);
    self.shared.wake.notify_one();

    if tokio::time::timeout(self.quit_timeout, self.done.cancelled())
      .await
      .is_err()
    {
      log::warn!("Player ignored quit for {:?}", self.quit_timeout);
      self.shared.kill.cancel();
      self.done.cancelled().await;
    }
  }
}

impl Drop for PlayerSession {
  fn drop(&mut self) {
    if self.is_running() {
      self.shared.kill.cancel();
    }
  }
}

fn exit_from_status(status: ExitStatus) -> ProcessExit {
  match status.code() {
    Some(code) => ProcessExit::normal(code),
    None => ProcessExit::crashed(exit_signal(status)),
  }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
  use std::os::unix::process::ExitStatusExt;
  status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
  None
}
