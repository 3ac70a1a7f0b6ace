use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod animation;
mod config;
mod controller;
mod http_server;
mod pages;
mod pixel_format;
mod presets;
mod protocol;
mod system_stats;
mod transport;

use animation::AnimationDriver;
use config::Config;
use controller::DeviceController;
use http_server::HttpServer;

#[derive(Parser)]
#[command(name = "ws2812_spi_server")]
#[command(about = "WS2812B LED strip controller over SPI\n\nDrives the strip from /dev/spidevB.D and serves an HTTP control panel and API.", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON); defaults are used when omitted
    config: Option<PathBuf>,

    /// HTTP port, overrides the config file
    #[arg(long)]
    port: Option<u16>,

    /// Number of LEDs on the strip, overrides the config file
    #[arg(long)]
    leds: Option<usize>,

    /// Skip the startup ring animation
    #[arg(long)]
    no_startup_ring: bool,

    /// Enable debug output (statistics, per-request logs)
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (hex dumps every frame)
    #[arg(long)]
    ddebug: bool,
}

/// Clear `running` on SIGINT, SIGTERM or SIGHUP so every exit goes through shutdown
fn install_shutdown_handler(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("Shutting down...");
        running.store(false, Ordering::Relaxed);
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.ddebug {
        "trace"
    } else if cli.debug {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    if let Some(leds) = cli.leds {
        config.strip.led_count = leds;
    }
    if cli.no_startup_ring {
        config.startup.enabled = false;
    }
    config.validate().context("Invalid configuration")?;

    // Fatal on a missing or inaccessible bus: nothing to retry until the host is fixed
    let controller = match DeviceController::initialize(&config.spi, &config.strip) {
        Ok(controller) => Arc::new(controller),
        Err(e) => {
            error!("✗ Failed to initialize SPI: {}", e);
            if let Some(hint) = e.hint() {
                error!("  {}", hint);
            }
            return Err(e.into());
        }
    };

    // Installed before the startup ring so a signal during it still blanks the strip
    let running = Arc::new(AtomicBool::new(true));
    if let Err(e) = install_shutdown_handler(Arc::clone(&running)) {
        warn!("Could not set signal handler: {}", e);
    }

    let animations = Arc::new(AnimationDriver::new(
        Arc::clone(&controller),
        config.animation.clone(),
        config.startup.clone(),
    ));

    if config.startup.enabled {
        if let Err(e) = animations.run_startup_ring(&running) {
            warn!("✗ Startup animation failed, LEDs not confirmed: {}", e);
        }
    }

    match controller.set_uniform_color(config.strip.initial_color) {
        Ok(()) => info!(
            "✓ Initialized {} LEDs to {}",
            config.strip.led_count, config.strip.initial_color
        ),
        Err(e) => warn!("✗ Failed to set initial color: {}", e),
    }

    let server = HttpServer::bind(
        &config.http,
        Arc::clone(&controller),
        Arc::clone(&animations),
        Arc::clone(&running),
    )?;

    let port = config.http.port;
    info!("{}", "=".repeat(50));
    info!("WS2812B LED Controller Started");
    info!("  Control Panel: http://localhost:{}", port);
    info!("  API Docs:      http://localhost:{}/api/docs", port);
    info!("  Health Check:  http://localhost:{}/health", port);
    info!("  LEDs:          {} connected", config.strip.led_count);
    info!("{}", "=".repeat(50));

    // Run server (blocks until shutdown)
    let served = server.run();

    // Graceful shutdown - stop animations, then blank the strip and release the bus
    animations.cancel();
    if let Err(e) = controller.shutdown() {
        warn!("✗ Error during shutdown: {}", e);
    }

    served
}
