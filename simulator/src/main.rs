mod tablet;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::time::Duration;
use tablet::SimulatedTablet;
use tracing::{debug, error, info, warn};

/// Emulates a fleet of tablets reporting to the monitor
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Monitor base URL
    #[arg(long, env = "MONITOR_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Number of simulated tablets
    #[arg(long, env = "DEVICES", default_value_t = 5)]
    devices: usize,

    /// Seconds between heartbeat rounds
    #[arg(long, env = "INTERVAL_SECS", default_value_t = 60)]
    interval_secs: u64,

    /// Simulated minutes that pass per round
    #[arg(long, env = "MINUTES_PER_TICK", default_value_t = 1.0)]
    minutes_per_tick: f64,

    /// RNG seed for a reproducible run
    #[arg(long, env = "SEED")]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatAck {
    critical_event: Option<String>,
    webhook_triggered: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting Tablet Simulator");
    info!(
        "Monitor: {}, Devices: {}, Interval: {}s",
        args.base_url, args.devices, args.interval_secs
    );

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let client = reqwest::Client::new();

    let mut fleet: Vec<SimulatedTablet> = (0..args.devices)
        .map(|i| SimulatedTablet::new(i, &mut rng))
        .collect();

    for tablet in &fleet {
        register(&client, &args.base_url, tablet).await;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    let mut rounds = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for tablet in fleet.iter_mut() {
                    tablet.step(&mut rng, args.minutes_per_tick);
                    send_heartbeat(&client, &args.base_url, tablet).await;
                }
                rounds += 1;
                if rounds % 10 == 0 {
                    info!("Completed {} heartbeat rounds", rounds);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }
}

async fn register(client: &reqwest::Client, base_url: &str, tablet: &SimulatedTablet) {
    let body = serde_json::json!({
        "device_id": tablet.device_id,
        "device_name": tablet.device_name,
    });

    match client
        .post(format!("{}/api/tablets", base_url))
        .json(&body)
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => info!("Registered {}", tablet.device_id),
        Ok(resp) if resp.status() == reqwest::StatusCode::CONFLICT => {
            debug!("{} already registered", tablet.device_id)
        }
        Ok(resp) => warn!("Registering {} returned {}", tablet.device_id, resp.status()),
        Err(e) => error!("Failed to register {}: {}", tablet.device_id, e),
    }
}

async fn send_heartbeat(client: &reqwest::Client, base_url: &str, tablet: &SimulatedTablet) {
    let heartbeat = tablet.heartbeat();
    let response = match client
        .post(format!("{}/api/heartbeat", base_url))
        .json(&heartbeat)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            warn!("Failed to send heartbeat for {}: {}", tablet.device_id, e);
            return;
        }
    };

    if !response.status().is_success() {
        warn!(
            "Heartbeat for {} rejected with {}",
            tablet.device_id,
            response.status()
        );
        return;
    }

    match response.json::<HeartbeatAck>().await {
        Ok(ack) => {
            if let Some(event) = ack.critical_event {
                warn!(
                    "{} reported {} (battery {}%, webhook triggered: {})",
                    tablet.device_id, event, heartbeat.battery_level, ack.webhook_triggered
                );
            } else {
                debug!(
                    "{} battery={} plugged_in={}",
                    tablet.device_id,
                    heartbeat.battery_level,
                    tablet.plugged_in()
                );
            }
        }
        Err(e) => error!("Unreadable heartbeat response for {}: {}", tablet.device_id, e),
    }
}
