use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use robomaster_control::actuator::dry_run::DryRunActuator;
use robomaster_control::actuator::mqtt_link::MqttLink;
use robomaster_control::actuator::Connection;
use robomaster_control::config::AppConfig;
use robomaster_control::control_loop::{run_frames, ControlLoop};
use robomaster_control::controller::{GamepadInput, InputSampler};
use robomaster_control::throttle::{CommandThrottler, EntityAllocator, SystemClock};
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Module groups that --log-groups can switch to trace level
const LOG_GROUPS: &[&str] = &["throttle", "controller", "actuator", "control_loop", "config"];

#[derive(Parser, Debug)]
#[command(name = "robomaster-control")]
#[command(about = "Drive a RoboMaster robot from a gamepad")]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config_dir>/robomaster-control/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma separated module groups to trace, e.g. "throttle,actuator"
    #[arg(long, value_delimiter = ',')]
    log_groups: Vec<String>,

    /// Log commands instead of (or without) sending them to a robot
    #[arg(long)]
    dry_run: bool,

    /// Override control.frame_rate_hz
    #[arg(long)]
    frame_rate: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(&cli.log_groups)?;

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::default_path()?,
    };
    info!("Using config file {}", config_path.display());
    let mut config = AppConfig::load_or_create(&config_path)?;
    if let Some(frame_rate) = cli.frame_rate {
        info!("Overriding frame rate: {} Hz", frame_rate);
        config.control.frame_rate_hz = frame_rate;
        config.validate()?;
    }

    let mut control: ControlLoop = ControlLoop::new(
        InputSampler::new(config.input.sampler_settings()),
        CommandThrottler::new(config.control.throttle_settings(), Instant::now()),
        config.control.mode,
        config.control.sink_failure,
    );

    // Actuators
    let allocator = EntityAllocator::new();
    if let Some(link_config) = config.link.clone() {
        let start_on_launch = link_config.start_on_launch;
        let mut link = MqttLink::new("robomaster", link_config);
        if start_on_launch {
            link.start()
                .map_err(|e| eyre!("Failed to bring up robot link: {}", e))?;
        }
        control.add(allocator.allocate(), Box::new(link));
    }
    if cli.dry_run || config.link.is_none() {
        if config.link.is_none() {
            warn!("No link configured, commands are only logged");
        }
        control.add(allocator.allocate(), Box::new(DryRunActuator::new("dry-run")));
    }

    // Gamepad
    let mut input = GamepadInput::create(Some(config.input.gamepad_settings()))?.initialize();
    if !input.has_gamepad() {
        info!("Waiting for a gamepad to connect");
    }

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                ctrl_c_token.cancel();
            }
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    let result = run_frames(
        &mut control,
        &mut input,
        &SystemClock,
        config.control.frame_interval(),
        cancel,
    )
    .await;

    control.shutdown();

    if let Err(e) = &result {
        error!("Control loop failed: {}", e);
    }
    result?;
    info!("Bye");
    Ok(())
}

fn setup(log_groups: &[String]) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(log_groups)?;
    Ok(())
}

fn setup_logging_env(log_groups: &[String]) -> Result<()> {
    let filter = if log_groups.is_empty() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        let mut filter = EnvFilter::new("info");
        for group in log_groups {
            let group = group.trim();
            if !LOG_GROUPS.contains(&group) {
                return Err(eyre!(
                    "Unknown log group '{}', expected one of {:?}",
                    group,
                    LOG_GROUPS
                ));
            }
            filter = filter.add_directive(format!("robomaster_control::{}=trace", group).parse()?);
        }
        filter
    };

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
    Ok(())
}
