//! `cliprelay` - CLI for the cliprelay capture service
//!
//! This binary runs the supervised capture service, checks store connectivity,
//! and shows or validates configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cliprelay::cli::{CheckCommand, Cli, Command, ConfigCommand, RunCommand};
use cliprelay::desktop::{ClipboardSource, HotkeyTriggers};
use cliprelay::diagnostic::{self, DiagnosticReport};
use cliprelay::{
    init_logging, CaptureService, Config, Glyph, Icons, PostgresStore, ServiceError, Store,
    Supervisor,
};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let verbosity = cli.verbosity();

    match cli.command {
        Command::Config(ConfigCommand::Validate { file }) => {
            init_logging(verbosity, None)?;
            Ok(handle_validate(file.or(cli.config)))
        }
        command => {
            let config =
                Config::load_from(cli.config.clone()).context("failed to load configuration")?;
            let _guard = init_logging(verbosity, config.logging.file.as_deref())?;

            match command {
                Command::Run(cmd) => handle_run(&config, &cmd).await,
                Command::Check(cmd) => handle_check(&config, &cmd).await,
                Command::Config(cmd) => handle_config(&config, cmd),
            }
        }
    }
}

async fn handle_run(config: &Config, cmd: &RunCommand) -> Result<ExitCode> {
    let icons = Icons::new(cmd.emoji.unwrap_or_else(|| config.logging.emoji.resolve()));

    // Credentials are checked once here rather than on every restart
    config
        .endpoints()
        .context("cannot start the capture service")?;
    cliprelay_desktop::init().map_err(|e| anyhow!("failed to initialize desktop bindings: {e}"))?;

    info!(
        "{} cliprelay {} starting on {}",
        icons.get(Glyph::Start),
        env!("CARGO_PKG_VERSION"),
        cliprelay_desktop::platform_name()
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone(), icons));

    let store: Arc<dyn Store> = Arc::new(PostgresStore::new());
    let factory = |restart_count: u32,
                   shutdown: CancellationToken|
     -> std::result::Result<CaptureService, ServiceError> {
        let triggers = HotkeyTriggers::new()?;
        CaptureService::from_config(
            config,
            Arc::clone(&store),
            Box::new(ClipboardSource::new()),
            Box::new(triggers),
            shutdown,
            restart_count,
            icons,
        )
    };

    let report = Supervisor::new(factory, shutdown, config.restart_backoff(), icons)
        .run()
        .await;

    info!(
        "{} cliprelay stopped after {} restart(s)",
        icons.get(Glyph::Stop),
        report.restart_count
    );
    Ok(ExitCode::SUCCESS)
}

async fn handle_check(config: &Config, cmd: &CheckCommand) -> Result<ExitCode> {
    let icons = Icons::new(config.logging.emoji.resolve());

    let report = match config.endpoints() {
        Ok(endpoints) => {
            let store = PostgresStore::new();
            diagnostic::run_checks(config, &store, &endpoints).await
        }
        Err(e) => {
            warn!(error = %e, "Skipping connection attempts");
            DiagnosticReport {
                settings: diagnostic::settings_summary(config),
                endpoints: Vec::new(),
            }
        }
    };

    if cmd.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render(icons));
    }

    Ok(if report.any_reachable() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<ExitCode> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = config.redacted();
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Store]");
                println!("  Database:           {}", config.store.database);
                println!("  User:               {}", config.store.user);
                println!(
                    "  Password:           {}",
                    config.store.password.as_deref().unwrap_or("(not set)")
                );
                println!("  Port:               {}", config.store.port);
                println!("  Primary host:       {}", config.store.primary_host);
                println!("  Fallback host:      {}", config.store.fallback_host);
                println!(
                    "  Connect timeout:    {}s",
                    config.store.connect_timeout_secs
                );
                println!();
                println!("[Retry]");
                println!("  Max retries:        {}", config.retry.max_retries);
                println!("  Base delay:         {} ms", config.retry.base_delay_ms);
                println!("  Max delay:          {} ms", config.retry.max_delay_ms);
                println!();
                println!("[Supervisor]");
                println!(
                    "  Restart delay:      {} ms",
                    config.supervisor.restart_delay_ms
                );
                println!(
                    "  Max restart delay:  {} ms",
                    config.supervisor.max_restart_delay_ms
                );
                println!(
                    "  Restart multiplier: {}",
                    config.supervisor.restart_multiplier
                );
                println!(
                    "  Liveness interval:  {} ms",
                    config.supervisor.liveness_interval_ms
                );
                println!();
                println!("[Hotkeys]");
                println!("  Capture:            {}", config.hotkeys.capture);
                println!("  Stop:               {}", config.hotkeys.stop);
                println!();
                println!("[Logging]");
                println!(
                    "  File:               {}",
                    config
                        .logging
                        .file
                        .as_ref()
                        .map_or_else(|| "(stderr only)".to_string(), |p| p.display().to_string())
                );
                println!("  Emoji:              {:?}", config.logging.emoji);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => return Ok(handle_validate(file)),
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_validate(file: Option<PathBuf>) -> ExitCode {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => {
            println!("Configuration is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Configuration error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Cancel `shutdown` on Ctrl-C or, on Unix, SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken, icons: Icons) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("{} Received Ctrl-C, stopping", icons.get(Glyph::Stop)),
        () = terminate => info!("{} Received terminate signal, stopping", icons.get(Glyph::Stop)),
    }
    shutdown.cancel();
}
