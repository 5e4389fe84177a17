//! Logging setup.
//!
//! Binaries install a global `tracing` subscriber with [`init`]. A stream can
//! additionally mirror its own diagnostics into a file: [`FileLog`] keeps a
//! scoped dispatcher that the stream enters for each tick. Events seen there
//! are still handed to the subscriber that was current when the file opened.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing::{warn, Dispatch, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::EnvFilter;

use crate::config::DiagnosticSettings;

/// File used when file logging is enabled without a path.
pub const DEFAULT_LOG_FILE: &str = "alembic-stream.log";

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber installed by the embedding application is kept.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Passes events on to another dispatcher.
struct Forward(Dispatch);

impl<S: Subscriber> Layer<S> for Forward {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.0.enabled(event.metadata()) {
            self.0.event(event);
        }
    }
}

/// File sink toggled by the diagnostic settings.
#[derive(Default)]
pub struct FileLog {
    synced: Option<(bool, bool, Option<PathBuf>)>,
    dispatch: Option<Dispatch>,
    path: Option<PathBuf>,
}

impl FileLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open, reopen or close the sink when the settings changed since the
    /// last call.
    pub fn sync(&mut self, diagnostics: &DiagnosticSettings) {
        let wanted = (
            diagnostics.log_to_file,
            diagnostics.verbose,
            diagnostics.log_path.clone(),
        );
        if self.synced.as_ref() == Some(&wanted) {
            return;
        }
        self.dispatch = None;
        self.path = None;

        if diagnostics.log_to_file {
            let path = diagnostics
                .log_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
            // Reopening on a settings change keeps what was already written.
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    let level = if diagnostics.verbose {
                        LevelFilter::DEBUG
                    } else {
                        LevelFilter::INFO
                    };
                    let outer = tracing::dispatcher::get_default(Dispatch::clone);
                    let file_layer = tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_filter(level);
                    let subscriber = tracing_subscriber::registry().with(file_layer).with(Forward(outer));
                    self.dispatch = Some(Dispatch::new(subscriber));
                    self.path = Some(path);
                }
                Err(err) => warn!(path = %path.display(), "cannot open log file: {err}"),
            }
        }
        self.synced = Some(wanted);
    }

    pub fn dispatch(&self) -> Option<&Dispatch> {
        self.dispatch.as_ref()
    }

    /// Path of the open log file.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.dispatch.is_some()
    }
}

impl std::fmt::Debug for FileLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLog").field("path", &self.path).finish()
    }
}
