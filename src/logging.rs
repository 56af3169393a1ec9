use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Default filter for a verbosity level: 0 = warn, 1 = info, 2+ = debug.
fn default_filter(verbose: u8) -> &'static str {
  match verbose {
    0 => "offline_proxy=warn",
    1 => "offline_proxy=info",
    _ => "offline_proxy=debug",
  }
}

/// Install the global subscriber.
///
/// Logs go to stderr so `fetch` output on stdout stays clean. With a log
/// directory they are also written to a daily-rotated file; keep the
/// returned guard alive until exit so buffered lines are flushed.
pub fn init(verbose: u8, directory: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

  match directory {
    Some(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(dir, "offline-proxy.log");
      let (file, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stderr.and(file))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

      Ok(None)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_verbosity_levels() {
    assert_eq!(default_filter(0), "offline_proxy=warn");
    assert_eq!(default_filter(1), "offline_proxy=info");
    assert_eq!(default_filter(5), "offline_proxy=debug");
  }
}
