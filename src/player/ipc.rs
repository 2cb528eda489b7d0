//! Async stdio connection to the player.
//!
//! One writer task owns stdin; one reader task per output stream feeds a
//! shared line channel. The channel closes once every output stream ends.

use async_channel::{Receiver, Sender};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use super::process::PlayerOutput;
use super::reader;

#[derive(Error, Debug)]
pub enum IpcError {
  #[error("Write failed: {0}")]
  WriteFailed(#[from] std::io::Error),
  #[error("Disconnected")]
  Disconnected,
}

/// Writer channel message.
enum WriteMessage {
  Command(String),
  Close,
}

/// Line-oriented connection to a running player.
pub struct PlayerIpc {
  write_tx: Sender<WriteMessage>,
  line_rx: Receiver<String>,
  _reader_handles: Vec<JoinHandle<()>>,
  _writer_handle: JoinHandle<()>,
}

impl PlayerIpc {
  /// Start the IO tasks for a freshly spawned process.
  pub fn setup<W>(writer: W, outputs: Vec<PlayerOutput>) -> Self
  where
    W: AsyncWrite + Send + Unpin + 'static,
  {
    let (line_tx, line_rx) = async_channel::unbounded();
    let (write_tx, write_rx) = async_channel::unbounded::<WriteMessage>();

    let reader_handles = outputs
      .into_iter()
      .enumerate()
      .map(|(index, output)| {
        let line_tx = line_tx.clone();
        tokio::spawn(async move {
          Self::reader_loop(index, output, line_tx).await;
        })
      })
      .collect();
    drop(line_tx);

    let writer_handle = tokio::spawn(async move {
      Self::writer_loop(writer, write_rx).await;
    });

    Self {
      write_tx,
      line_rx,
      _reader_handles: reader_handles,
      _writer_handle: writer_handle,
    }
  }

  async fn reader_loop<R: AsyncRead + Unpin>(index: usize, stream: R, line_tx: Sender<String>) {
    log::debug!("Player output {} reader started", index);
    let lines = reader::lines(stream);
    futures_util::pin_mut!(lines);

    while let Some(line) = futures_util::StreamExt::next(&mut lines).await {
      log::trace!("{}: {}", index, line);
      if line_tx.send(line).await.is_err() {
        break;
      }
    }
    log::debug!("Player output {} closed", index);
  }

  async fn writer_loop<W: AsyncWrite + Unpin>(mut writer: W, write_rx: Receiver<WriteMessage>) {
    log::debug!("Player stdin writer started");

    while let Ok(msg) = write_rx.recv().await {
      match msg {
        WriteMessage::Command(line) => {
          if let Err(e) = Self::write_line(&mut writer, &line).await {
            log::error!("Player stdin write error: {}", e);
            break;
          }
          log::debug!("Command written: {}", line);
        }
        WriteMessage::Close => {
          log::debug!("Player stdin writer closing");
          break;
        }
      }
    }
    // stdin is closed by dropping the writer
  }

  async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), IpcError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
  }

  /// Queue one command line.
  pub async fn send(&self, command: String) -> Result<(), IpcError> {
    self
      .write_tx
      .send(WriteMessage::Command(command))
      .await
      .map_err(|_| IpcError::Disconnected)
  }

  /// Receiver of every output line.
  pub fn lines(&self) -> Receiver<String> {
    self.line_rx.clone()
  }

  /// Stop writing and close the player's stdin.
  pub fn close(&self) {
    let _ = self.write_tx.try_send(WriteMessage::Close);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::AsyncReadExt;

  #[tokio::test]
  async fn test_lines_from_every_stream_then_close() {
    let (writer, _unused) = tokio::io::duplex(64);
    let stdout: &'static [u8] = b"ANS_LENGTH=12.0\n";
    let stderr: &'static [u8] = b"Exiting... (Quit)\n";
    let outputs: Vec<PlayerOutput> = vec![Box::new(stdout), Box::new(stderr)];
    let ipc = PlayerIpc::setup(writer, outputs);

    let rx = ipc.lines();
    let mut received = Vec::new();
    while let Ok(line) = rx.recv().await {
      received.push(line);
    }
    received.sort();
    assert_eq!(received, vec!["ANS_LENGTH=12.0", "Exiting... (Quit)"]);
  }

  #[tokio::test]
  async fn test_commands_are_newline_terminated() {
    let (writer, mut player_stdin) = tokio::io::duplex(256);
    let ipc = PlayerIpc::setup(writer, Vec::new());

    ipc.send("get_property length".into()).await.unwrap();
    ipc.send("quit".into()).await.unwrap();
    ipc.close();

    let mut written = String::new();
    player_stdin.read_to_string(&mut written).await.unwrap();
    assert_eq!(written, "get_property length\nquit\n");
  }
}
