use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use duna_screen::config::{Configuration, GrayRotaryConfig, ViewerOptions};
use duna_screen::control_panel::{ControlPanel, RotarySource, RotaryWatcher};
use duna_screen::events::NavCommand;
use duna_screen::platform::gpio_rotary::GpioRotary;
use duna_screen::sync::DataDirs;
use duna_screen::tasks::display::DisplayOutput;
use duna_screen::tasks::viewer::{CommandBackend, LogBackend, ViewerBackend, ViewerContext};

#[derive(Debug, Parser)]
#[command(
    name = "duna-screen",
    version,
    about = "Space picture frame: NASA pictures on a full-screen viewer"
)]
struct Args {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE", default_value = "duna.yaml")]
    config: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Log what would be shown instead of launching viewer programs
    #[arg(long = "dry-run")]
    dry_run: bool,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(format!("duna_screen={level}"))
            .add_directive("reqwest=warn".parse()?)
            .add_directive("hyper=warn".parse()?),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
    Ok(())
}

fn backend(label: &str, argv: &[String], dry_run: bool) -> Result<Box<dyn ViewerBackend>> {
    if dry_run || argv.is_empty() {
        return Ok(Box::new(LogBackend::new(label)));
    }
    Ok(Box::new(CommandBackend::new(label, argv.to_vec())?))
}

fn viewer_context(opts: &ViewerOptions, dry_run: bool) -> Result<ViewerContext> {
    Ok(ViewerContext::new(
        backend("image", &opts.image_command, dry_run)?,
        backend("web", &opts.web_command, dry_run)?,
    ))
}

fn start_rotary(
    cfg: &GrayRotaryConfig,
    panel_root: Arc<duna_screen::channels::SlideshowChannels>,
    cancel: CancellationToken,
) -> Result<std::thread::JoinHandle<()>> {
    let source = GpioRotary::open(&cfg.chip, &cfg.pins, cfg.sequence.clone())?;
    let panel = ControlPanel::new(panel_root, source.ring_size());
    RotaryWatcher::new(source, cfg.poll_interval)
        .on_change(cancel, move |old, new| panel.on_rotary_change(old, new))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let cfg = Configuration::from_yaml_file(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?
        .validated()
        .context("validating configuration")?;
    info!(title = %cfg.display.title, channels = cfg.channels.len(), "starting");

    DataDirs::new(&cfg.data_dir).prepare()?;

    let (viewer, viewer_thread) = viewer_context(&cfg.viewer, args.dry_run)?.spawn()?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("duna-screen/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let display = DisplayOutput::from_config(&cfg, Arc::new(viewer.clone()), client)?;

    let cancel = CancellationToken::new();
    let (nav_tx, nav_rx) = mpsc::channel::<NavCommand>(16);

    let rotary_thread = match cfg.controllers.as_ref().and_then(|c| c.gray_rotary.as_ref()) {
        Some(rotary) => match start_rotary(rotary, display.root().clone(), cancel.clone()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("rotary control unavailable: {err:#}");
                None
            }
        },
        None => {
            debug!("no rotary controller configured");
            None
        }
    };

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = sigterm.recv() => {
                                info!("SIGTERM received; initiating shutdown");
                                cancel.cancel();
                            }
                        }
                    }
                    Err(err) => warn!("failed to register SIGTERM handler: {err}"),
                }
            });
        }

        for (kind, name, command) in [
            (SignalKind::user_defined1(), "SIGUSR1", NavCommand::Next),
            (SignalKind::user_defined2(), "SIGUSR2", NavCommand::Previous),
        ] {
            let cancel = cancel.clone();
            let nav_tx = nav_tx.clone();
            tokio::spawn(async move {
                match signal(kind) {
                    Ok(mut stream) => loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            received = stream.recv() => {
                                if received.is_none() {
                                    break;
                                }
                                info!(signal = name, ?command, "manual navigation");
                                if let Err(err) = nav_tx.send(command).await {
                                    warn!("failed to forward navigation request: {err}");
                                    break;
                                }
                            }
                        }
                    },
                    Err(err) => warn!("failed to register {name} handler: {err}"),
                }
            });
        }
    }
    drop(nav_tx);

    if let Err(err) = display.run(cancel.clone(), nav_rx).await {
        error!("display failed: {err:#}");
    }
    cancel.cancel();

    if let Some(handle) = rotary_thread {
        if handle.join().is_err() {
            error!("rotary thread panicked");
        }
    }
    viewer.shutdown();
    if viewer_thread.join().is_err() {
        error!("viewer thread panicked");
    }
    info!("bye");
    Ok(())
}
