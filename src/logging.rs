use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

// The non-blocking writer stops flushing once its guard drops, so the guard
// lives for the process lifetime.
static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static INIT: OnceCell<()> = OnceCell::new();

fn log_dir() -> Option<PathBuf> {
    if let Ok(fake) = std::env::var("PACER_FAKE_APPDATA") {
        return Some(PathBuf::from(fake).join("logs"));
    }
    dirs::data_dir().map(|base| base.join("com.pacer.app").join("logs"))
}

/// Install the tracing subscriber: stderr fmt layer plus a daily-rolling
/// file sink under the app data dir. Safe to call more than once; only the
/// first call wins.
pub fn init() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,pacer=debug"));

        let file_writer = log_dir().and_then(|dir| {
            std::fs::create_dir_all(&dir).ok()?;
            let appender = tracing_appender::rolling::daily(dir, "pacer.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(writer)
        });

        // Stderr keeps stdout clean for the CLI's table/JSON output.
        match file_writer {
            Some(writer) => {
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .try_init();
            }
            None => {
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .try_init();
            }
        }
        // Route `log` macros from dependencies through tracing. The fmt
        // subscriber may have installed the bridge already; ignore the
        // second-install error.
        let _ = tracing_log::LogTracer::init();
    });
}
