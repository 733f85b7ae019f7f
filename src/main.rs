use anyhow::{Context, Result};
use chargeflow::{
    build_services, ApiListener, ChargeflowConfig, ConfigStore, ServiceContext, ServiceManager,
    ShutdownReason,
};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "chargeflow")]
#[command(about = "Service lifecycle orchestration for a real-time charging platform")]
#[command(version)]
#[command(long_about = "Starts the charging platform services concurrently, each one waiting \
only on the readiness of its own dependencies, reloads them when their configuration section \
changes and shuts them down in reverse dependency order.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "chargeflow.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting any service")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - register services but don't start them
    #[arg(long, help = "Perform dry run - build and register services but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting chargeflow v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match ChargeflowConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let (reload_tx, reload_rx) = mpsc::channel(config.general.reload_channel_capacity);
    let store = Arc::new(ConfigStore::with_reload_sender(config, reload_tx));
    let manager = ServiceManager::new(Arc::clone(&store));
    let listener = Arc::new(ApiListener::new());

    let ctx = ServiceContext::new(Arc::clone(&store), manager.registry(), listener);
    manager
        .add_services(build_services(&ctx))
        .context("Failed to register services")?;

    if args.dry_run {
        info!("Dry run mode - services registered but not started");
        println!(
            "✓ Dry run completed successfully - {} services registered",
            manager.registry().len()
        );
        return Ok(());
    }

    let reload_manager = manager.clone();
    tokio::spawn(async move { reload_manager.run_reload_loop(reload_rx).await });

    let reason = match manager.start_services().await {
        Ok(report) => {
            info!(
                "Chargeflow is running (node {}, {} services)",
                store.current().general.node_id,
                report.started.len()
            );
            wait_for_shutdown(&store, &args.config).await?
        }
        Err(e) => {
            error!("Failed to start services: {}", e);
            ShutdownReason::Error(e.to_string())
        }
    };
    info!("Shutdown initiated: {:?}", reason);

    manager.stop_reload_loop();
    let budget = store.current().general.shutdown_timeout();
    let report = manager.shutdown_services(budget).await;
    if !report.abandoned.is_empty() {
        warn!("Abandoned during shutdown: {}", report.abandoned.join(", "));
    }
    let exit_code = match reason {
        ShutdownReason::Error(_) => 1,
        ShutdownReason::Signal(_) => report.exit_code(),
    };

    info!("Chargeflow exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

/// Block until a termination signal, reloading configuration on SIGHUP
#[cfg(unix)]
async fn wait_for_shutdown(store: &ConfigStore, config_path: &str) -> Result<ShutdownReason> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to register SIGHUP handler")?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
                return Ok(ShutdownReason::Signal("SIGTERM".to_string()));
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received SIGINT signal (Ctrl+C)");
                return Ok(ShutdownReason::Signal("SIGINT".to_string()));
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP signal, reloading {}", config_path);
                if let Err(e) = store.reload_from_file(config_path).await {
                    error!("Configuration reload failed, keeping current configuration: {}", e);
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_store: &ConfigStore, _config_path: &str) -> Result<ShutdownReason> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C");
    Ok(ShutdownReason::Signal("SIGINT".to_string()))
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chargeflow={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    let rendered = toml::to_string_pretty(&ChargeflowConfig::default())
        .context("Failed to render default configuration")?;
    println!("# Chargeflow Configuration File");
    println!("# Environment overrides use CHARGEFLOW_<SECTION>__<KEY>");
    println!();
    println!("{}", rendered);
    Ok(())
}
