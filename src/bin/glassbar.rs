//! Glassbar Binary
//!
//! Wires the orchestration core to default collaborators (TOML configuration
//! store, null window manager, disabled startup registration) and runs the
//! dispatch loop until a quit signal carries out the process exit code.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use glassbar::app::App;
use glassbar::config::{default_config_path, ConfigStore, ConfigWatcher, FileConfigStore};
use glassbar::dispatch::DispatchLoop;
use glassbar::host::NullWindowManager;
use glassbar::logging::{init_logging, LoggingConfig};
use glassbar::startup::{DisabledStartup, StartupManager};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "glassbar", about = "Shell customization runtime", version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity to debug
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long)]
    log_format: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(exit_code) => process::exit(exit_code),
        Err(error) => {
            eprintln!("glassbar: {error:#}");
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => default_config_path().context("resolving configuration path")?,
    };
    let store = Arc::new(
        FileConfigStore::open(config_path.clone()).context("opening configuration store")?,
    );
    let first_run = !store.file_exists();

    init_logging(Some(&build_logging_config(&cli, store.as_ref())))
        .context("initializing logging")?;
    info!(config = %config_path.display(), first_run, "glassbar starting");

    let (dispatch, events, main) = DispatchLoop::new();
    let window = Arc::new(NullWindowManager);
    let startup = Arc::new(DisabledStartup);
    let app = App::new(
        main.clone(),
        events,
        store.clone(),
        startup.clone(),
        window.clone(),
    );

    // Re-apply configuration when the file changes on disk.
    let _watcher = if store.get_config().watch_config_file {
        let watcher_app = app.clone();
        let watcher_store = store.clone();
        let watcher_main = main;
        match ConfigWatcher::spawn(config_path, move || {
            let app = watcher_app.clone();
            let store = watcher_store.clone();
            let dispatched = watcher_main.dispatch(move || {
                if let Err(error) = store.reload() {
                    warn!(%error, "could not reload configuration");
                }
                app.configuration_changed();
            });
            if let Err(error) = dispatched {
                warn!(%error, "could not dispatch configuration change");
            }
        }) {
            Ok(watcher) => Some(watcher),
            Err(error) => {
                warn!(%error, "configuration watching disabled");
                None
            }
        }
    } else {
        None
    };

    if first_run {
        app.begin_onboarding(startup.acquire_task())
            .context("starting onboarding")?;
    }

    let exit_code = match dispatch.run(window.as_ref()) {
        Ok(exit_code) => exit_code,
        Err(fatal) => {
            error!(%fatal, "dispatch loop terminated abnormally");
            return Err(fatal.into());
        }
    };
    info!(exit_code, "glassbar exiting");
    Ok(exit_code)
}

/// Build logging configuration with CLI flags taking precedence over the
/// configuration file.
fn build_logging_config(cli: &Cli, store: &FileConfigStore) -> LoggingConfig {
    let mut config = store.get_config().logging;
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    config
}
