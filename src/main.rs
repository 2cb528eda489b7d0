use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use slavectl::media::{SubtitleId, SubtitleOrigin};
use slavectl::protocol::SeekMode;
use slavectl::{Action, BackendKind, MediaSource, Notification, PlayerConfig, PlayerSession};

#[derive(Parser, Debug)]
#[command(
  name = "slavectl",
  about = "Play a file, stream or disc through MPlayer or mpv and print what happens",
  arg_required_else_help = true
)]
struct Cli {
  /// File, URL or disc target such as dvd://2
  target: String,

  /// Player to use [default: from config, else mplayer]
  #[arg(short, long)]
  backend: Option<BackendKind>,

  /// Path to JSON config file [default: <config dir>/slavectl/config.json]
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Start playback at this many seconds
  #[arg(short, long)]
  start: Option<f64>,

  /// Print notifications as JSON lines
  #[arg(long)]
  json: bool,
}

fn load_config(explicit: Option<PathBuf>) -> Result<PlayerConfig, slavectl::ConfigError> {
  match explicit.or_else(PlayerConfig::default_path) {
    Some(path) if path.exists() => PlayerConfig::load(&path),
    _ => Ok(PlayerConfig::default()),
  }
}

/// Parse one stdin command.
fn parse_command(line: &str) -> Option<Action> {
  let mut words = line.split_whitespace();
  let action = match (words.next()?, words.next()) {
    ("seek", Some(target)) => Action::Seek {
      target: target.parse().ok()?,
      mode: if target.starts_with(['+', '-']) {
        SeekMode::Relative
      } else {
        SeekMode::Absolute
      },
      precise: true,
    },
    ("pause", None) => Action::TogglePause,
    ("step", None) => Action::FrameStep,
    ("back", None) => Action::FrameBackStep,
    ("aid", Some(id)) => Action::SetAudioTrack { id: id.parse().ok()? },
    ("sid", Some("off")) => Action::SetSubtitle { id: None },
    ("sid", Some(id)) => Action::SetSubtitle {
      id: Some(SubtitleId::new(SubtitleOrigin::Demuxer, id.parse().ok()?)),
    },
    ("shot", None) => Action::Screenshot,
    ("quit", None) => Action::Quit,
    _ => return None,
  };
  Some(action)
}

fn print_notification(notification: &Notification, json: bool) {
  if json {
    match serde_json::to_string(notification) {
      Ok(line) => println!("{}", line),
      Err(e) => log::warn!("Failed to serialize notification: {}", e),
    }
  } else {
    println!("{:?}", notification);
  }
}

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut config = match load_config(cli.config) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("error: {}", e);
      return ExitCode::FAILURE;
    }
  };
  if let Some(backend) = cli.backend {
    config.backend = backend;
  }

  let mut source = MediaSource::parse(&cli.target);
  if let Some(start) = cli.start {
    source = source.starting_at(start);
  }

  let session = match PlayerSession::start(&config, &source) {
    Ok(session) => session,
    Err(e) => {
      eprintln!("error: {}", e);
      return ExitCode::FAILURE;
    }
  };

  let notifications = session.notifications();
  let mut stdin = BufReader::new(tokio::io::stdin()).lines();
  let mut stdin_open = true;

  loop {
    tokio::select! {
      notification = notifications.recv() => {
        let Ok(notification) = notification else {
          return ExitCode::FAILURE;
        };
        print_notification(&notification, cli.json);
        if let Notification::SessionEnded(outcome) = notification {
          return if outcome.is_success() {
            ExitCode::SUCCESS
          } else {
            ExitCode::FAILURE
          };
        }
      }
      line = stdin.next_line(), if stdin_open => match line {
        Ok(Some(line)) if line.trim().is_empty() => {}
        Ok(Some(line)) => match parse_command(&line) {
          Some(action) => {
            if let Err(e) = session.send(action) {
              log::warn!("{}", e);
            }
          }
          None => eprintln!("unknown command: {}", line.trim()),
        },
        Ok(None) | Err(_) => {
          stdin_open = false;
          session.stop().await;
        }
      },
    }
  }
}
