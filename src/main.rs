// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the air conditioner controller daemon
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio::signal;

use autoaircon::config::{Config, PidParamFile};
use autoaircon::daemon::Daemon;
use autoaircon::server::tcp::Deferred;
use autoaircon::server::SHUTDOWN_CMD;

/// Closed-loop air conditioner controller
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target temperature in degrees Celsius
    #[arg(long, default_value_t = 26.0)]
    ttemp: f64,

    /// Path to configuration file (INI format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command server port (overrides configuration)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// MQTT broker host (overrides configuration)
    #[arg(long)]
    mqtt_host: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    config.apply_args(args.port, args.mqtt_host.clone());

    if args.show_config {
        print!("{}", config.to_ini_string());
        return Ok(());
    }

    let params = PidParamFile::load();
    info!("start: ttemp={:.1}", args.ttemp);

    let mut daemon = Daemon::launch(config, params, args.ttemp).await?;

    // Route Ctrl-C through the regular shutdown command so it is serialized
    // with the deferred queue.
    let shutdown_queue = daemon.command_queue();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            let _ = shutdown_queue
                .send(Deferred {
                    args: vec![SHUTDOWN_CMD.to_string()],
                    reply: None,
                })
                .await;
        }
    });

    daemon.run().await?;
    info!("end");
    Ok(())
}
