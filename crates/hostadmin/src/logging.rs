//! Log output to stderr and to the tool's log file

use hostadmin_config::LoggingSettings;
use std::fs::{File, OpenOptions};
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Level selected by `-v` / `-q`
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Open the log file for appending, creating its directory
fn open_log_file(settings: &LoggingSettings) -> std::io::Result<File> {
    std::fs::create_dir_all(&settings.dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(settings.dir.join(&settings.file))
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides the level. The file layer is only added when the log
/// file can be opened; the returned guard flushes it on drop.
pub fn init(settings: &LoggingSettings, level: LevelFilter) -> Option<WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file, guard, unavailable) = match open_log_file(settings) {
        Ok(log) => {
            let (writer, guard) = tracing_appender::non_blocking(log);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();

    if let Some(e) = unavailable {
        warn!(dir = %settings.dir.display(), error = %e, "log file unavailable");
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_level_for_flags() {
        assert_eq!(level_for(0, false), LevelFilter::INFO);
        assert_eq!(level_for(1, false), LevelFilter::DEBUG);
        assert_eq!(level_for(3, false), LevelFilter::TRACE);
        assert_eq!(level_for(2, true), LevelFilter::ERROR);
    }

    #[test]
    fn test_open_log_file_appends() {
        let root = TempDir::new().unwrap();
        let settings = LoggingSettings {
            dir: root.path().join("var/log/yunohost"),
            file: "hostadmin.log".to_string(),
        };
        let path = settings.dir.join(&settings.file);

        open_log_file(&settings).unwrap();
        std::fs::write(&path, "first\n").unwrap();
        open_log_file(&settings).unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "first\n");
    }

    #[test]
    fn test_unopenable_log_file_is_an_error() {
        let root = TempDir::new().unwrap();
        // the directory exists but the file name is taken by a directory
        let taken = LoggingSettings {
            dir: root.path().to_path_buf(),
            file: "logs".to_string(),
        };
        std::fs::create_dir(root.path().join("logs")).unwrap();
        assert!(open_log_file(&taken).is_err());

        std::fs::write(root.path().join("plain"), "").unwrap();
        let under_file = LoggingSettings {
            dir: root.path().join("plain/logs"),
            file: "hostadmin.log".to_string(),
        };
        assert!(open_log_file(&under_file).is_err());
    }
}
