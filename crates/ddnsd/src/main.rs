// # ddnsd - OPNsense to Hetzner DNS daemon
//
// This daemon is a thin integration layer:
// 1. Parse the command line and set up logging
// 2. Load configuration (file or environment)
// 3. Register the Hetzner provider and the OPNsense interface source
// 4. Run the reconciliation engine until SIGTERM/SIGINT
//
// All DNS, retry and reconciliation logic lives in ddns-core.
//
// ## Configuration
//
// `--config PATH`, else `/etc/opnsense-dyndns-hetzner/config.yaml` when
// present, else environment variables (`OPNSENSE_URL`, `HETZNER_TOKEN`,
// `DYNDNS_RECORDS`, ...). See `ddns_core::config`.
//
// ## Example
//
// ```bash
// ddnsd --config /etc/opnsense-dyndns-hetzner/config.yaml --log-format text
// ddnsd --once --dry-run --log-level debug
// ```

mod health;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use ddns_core::config::load_config_auto;
use ddns_core::traits::{DnsProvider, InterfaceSource};
use ddns_core::{
    DdnsConfig, DdnsEngine, ProviderRegistry, RateLimiter, Readiness, ReadinessCheck, RecordSync,
    RetryPolicy,
};
use ddns_verify::AuthoritativeVerifier;
use logging::{LogFormat, LogLevel};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Keep Hetzner DNS A records in sync with OPNsense interface addresses
#[derive(Debug, Parser)]
#[command(name = "ddnsd", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Don't make changes, just log what would be done
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(long, value_enum, env = "DDNS_LOG_LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,

    /// Run a single update cycle and exit
    #[arg(long)]
    once: bool,
}

/// Everything the run loop needs, built from configuration
struct Daemon {
    engine: DdnsEngine,
    readiness: Arc<dyn ReadinessCheck>,
    events: tokio::sync::mpsc::Receiver<ddns_core::EngineEvent>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init(args.log_level, args.log_format) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return DdnsExitCode::ConfigError.into();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "ddnsd starting");

    let (mut config, source) = match load_config_auto(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return DdnsExitCode::ConfigError.into();
        }
    };
    config.settings.dry_run |= args.dry_run;

    info!(
        source = %source,
        zone = %config.hetzner.zone,
        records = config.records.len(),
        interval = config.settings.interval,
        dry_run = config.settings.dry_run,
        "Configuration loaded"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create tokio runtime");
            return DdnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run(config, args.once)).into()
}

/// Build components, then run once or until shutdown
async fn run(config: DdnsConfig, once: bool) -> DdnsExitCode {
    let daemon = match build(&config) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "Failed to initialize");
            return DdnsExitCode::ConfigError;
        }
    };

    match run_daemon(daemon, &config, once).await {
        Ok(()) => {
            info!("Shutdown complete");
            DdnsExitCode::CleanShutdown
        }
        Err(e) => {
            error!(error = %e, "Daemon error");
            DdnsExitCode::RuntimeError
        }
    }
}

/// Wire the provider, interface source and optional collaborators
fn build(config: &DdnsConfig) -> ddns_core::Result<Daemon> {
    let registry = ProviderRegistry::new();
    ddns_provider_hetzner::register(&registry);
    ddns_ip_opnsense::register(&registry);

    let provider: Arc<dyn DnsProvider> = Arc::from(registry.create_provider("hetzner", config)?);
    let source: Arc<dyn InterfaceSource> =
        Arc::from(registry.create_interface_source("opnsense", config)?);

    let records = Arc::new(RecordSync::new(
        provider,
        config.hetzner.zone.clone(),
        config.hetzner.ttl,
        RateLimiter::new(config.hetzner.requests_per_minute),
        RetryPolicy::from_config(&config.retry),
    ));

    let (engine, events) = DdnsEngine::new(Arc::clone(&source), Arc::clone(&records), config);
    let engine = engine.with_verifier(Arc::new(AuthoritativeVerifier::new(
        config.settings.nameservers.clone(),
    )));

    #[cfg(feature = "kubernetes")]
    let engine = if config.kubernetes.enabled {
        info!(
            trigger_hostname = %config.kubernetes.trigger_hostname,
            label_selector = %config.kubernetes.label_selector,
            "Kubernetes annotation updates enabled"
        );
        engine.with_annotation_updater(Arc::new(ddns_k8s::KubeAnnotationUpdater::new()))
    } else {
        engine
    };

    #[cfg(not(feature = "kubernetes"))]
    if config.kubernetes.enabled {
        warn!("Kubernetes integration requested but ddnsd was built without the kubernetes feature");
    }

    Ok(Daemon {
        engine,
        readiness: Arc::new(Readiness::new(source, records)),
        events,
    })
}

/// Run the daemon
async fn run_daemon(daemon: Daemon, config: &DdnsConfig, once: bool) -> Result<()> {
    let Daemon {
        engine,
        readiness,
        mut events,
    } = daemon;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "Engine event");
        }
    });

    let signals = wait_for_shutdown().await?;

    if once {
        match run_once(&engine, signals).await {
            Some(signal) => info!(signal, "Received shutdown signal, single run abandoned"),
            None => info!("Single run complete, exiting"),
        }
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let (stop_tx, stop_rx) = watch::channel(false);

    let health = match config.settings.health_port {
        Some(port) => {
            let listener = health::bind(port)
                .await
                .with_context(|| format!("Failed to bind health server on port {port}"))?;
            Some(tokio::spawn(health::serve(listener, readiness, stop_rx)))
        }
        None => None,
    };

    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let signal = signals.await;
            info!(signal, "Received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
            let _ = stop_tx.send(true);
        });
    }

    engine.run_until(&shutdown, config.settings.interval()).await;

    if let Some(handle) = health {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Health server stopped with error"),
            Err(e) => warn!(error = %e, "Health server task failed"),
        }
    }

    Ok(())
}

/// Run one cycle unless a shutdown signal arrives first
///
/// Returns the signal that interrupted the cycle, if any.
async fn run_once(engine: &DdnsEngine, signals: impl Future<Output = &'static str>) -> Option<&'static str> {
    tokio::select! {
        biased;
        signal = signals => Some(signal),
        _ = engine.run_cycle() => None,
    }
}

/// Install SIGTERM/SIGINT handlers
///
/// Handlers are registered before returning; the returned future resolves
/// with the name of the first signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<impl Future<Output = &'static str>> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Install the CTRL-C handler
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                error!(error = %e, "Failed to wait for CTRL-C");
                std::future::pending().await
            }
        }
    })
}
