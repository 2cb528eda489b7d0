//! Byte stream to line stream.
//!
//! Players rewrite their status line in place with a bare `\r`, so both
//! `\r` and `\n` end a line.

use std::collections::VecDeque;

use futures_util::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

/// Splits raw output into trimmed, non-empty lines.
#[derive(Debug, Default)]
pub struct LineSplitter {
  buf: Vec<u8>,
}

impl LineSplitter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append bytes and return every line they complete.
  pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    for &byte in bytes {
      if byte == b'\n' || byte == b'\r' {
        let raw = std::mem::take(&mut self.buf);
        lines.extend(decode(&raw));
      } else {
        self.buf.push(byte);
      }
    }
    lines
  }

  /// The trailing line of a stream that did not end with a terminator.
  pub fn finish(&mut self) -> Option<String> {
    let raw = std::mem::take(&mut self.buf);
    decode(&raw)
  }
}

fn decode(raw: &[u8]) -> Option<String> {
  let text = match std::str::from_utf8(raw) {
    Ok(text) => text.to_string(),
    Err(e) => {
      log::debug!("Invalid UTF-8 in player output ({}), decoding lossily", e);
      String::from_utf8_lossy(raw).into_owned()
    }
  };
  let trimmed = text.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_string())
}

struct ReadState<R> {
  reader: R,
  splitter: LineSplitter,
  pending: VecDeque<String>,
  done: bool,
}

/// Lazily read `reader` as a stream of lines. Read errors end the stream.
pub fn lines<R>(reader: R) -> impl Stream<Item = String>
where
  R: AsyncRead + Unpin,
{
  let state = ReadState {
    reader,
    splitter: LineSplitter::new(),
    pending: VecDeque::new(),
    done: false,
  };

  futures_util::stream::unfold(state, |mut state| async move {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
      if let Some(line) = state.pending.pop_front() {
        return Some((line, state));
      }
      if state.done {
        return None;
      }
      match state.reader.read(&mut chunk).await {
        Ok(0) => {
          state.done = true;
          state.pending.extend(state.splitter.finish());
        }
        Ok(n) => {
          let lines = state.splitter.push(&chunk[..n]);
          state.pending.extend(lines);
        }
        Err(e) => {
          log::error!("Player output read error: {}", e);
          state.done = true;
          state.pending.extend(state.splitter.finish());
        }
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures_util::StreamExt;

  #[test]
  fn test_carriage_return_and_blank_lines() {
    let mut splitter = LineSplitter::new();
    let lines = splitter.push(b"A:   1.0 V:   1.0\rA:   1.1 V:   1.1\r\n\n  \nID_LENGTH=");
    assert_eq!(lines, vec!["A:   1.0 V:   1.0", "A:   1.1 V:   1.1"]);
    assert_eq!(splitter.push(b"12.00\n"), vec!["ID_LENGTH=12.00"]);
    assert_eq!(splitter.finish(), None);
  }

  #[test]
  fn test_invalid_utf8_is_decoded_lossily() {
    let mut splitter = LineSplitter::new();
    let lines = splitter.push(b"ID_CLIP_INFO_VALUE0=caf\xe9\n");
    assert_eq!(lines, vec!["ID_CLIP_INFO_VALUE0=caf\u{fffd}"]);
  }

  #[tokio::test]
  async fn test_stream_yields_unterminated_tail() {
    let input: &[u8] = b"Playing a.mkv.\n\rExiting... (End of file)";
    let lines: Vec<String> = lines(input).collect().await;
    assert_eq!(lines, vec!["Playing a.mkv.", "Exiting... (End of file)"]);
  }
}
