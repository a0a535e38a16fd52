//! Line-oriented ingestion gateway.
//!
//! Reads one advertisement per line from stdin, as `<device-id> <hex>`, and
//! feeds it to the engine. Completed measurements and abandoned cycles are
//! logged; statistics are served over HTTP.
//!
//! # Usage
//!
//! ```bash
//! scanner-dump | cargo run --bin gateway
//! ```
//!
//! Engine settings come from `MPBLE_*` environment variables, logging from
//! `RUST_LOG`.

use log::{debug, error, info, warn};
use multipacket_ble::normalize::payload_from_hex;
use multipacket_ble::{
    DeviceId, Engine, EngineConfig, Outcome, ProtocolRegistry, StatsServer, DEFAULT_STATS_PORT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interval between statistics summaries in the log.
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Split a `<device-id> <hex>` line. Blank lines and `#` comments yield `None`.
fn parse_line(line: &str) -> Option<Result<(DeviceId, Vec<u8>), String>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let Some((device, hex)) = line.split_once(char::is_whitespace) else {
        return Some(Err(format!("missing payload: {}", line)));
    };
    Some(
        payload_from_hex(hex)
            .map(|payload| (DeviceId::new(device), payload))
            .map_err(|e| e.to_string()),
    )
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== Multi-packet BLE gateway starting ===");

    let engine = match Engine::start(EngineConfig::from_env(), ProtocolRegistry::default()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Failed to start engine: {}", e);
            std::process::exit(1);
        }
    };
    let config = engine.config();
    info!(
        "Engine ready: retention {:?}, stream timeout {:?}, cycle limit {:?}, versions {:?}",
        config.dedup_retention,
        config.stream_timeout,
        config.max_active_cycles,
        engine.registry().versions()
    );

    engine.on_complete(|device, measurement| {
        info!(
            "Measurement from {} cycle {}: {} samples, reference span {:?}",
            device,
            measurement.cycle_id,
            measurement.sample_count(),
            measurement.reference_span
        );
    });
    engine.on_timeout(|cycle| {
        warn!(
            "Lost cycle {} from {} ({}/{} packets)",
            cycle.cycle_id, cycle.device, cycle.received, cycle.expected
        );
    });

    let _stats_server = match StatsServer::start(None, DEFAULT_STATS_PORT, engine.clone()) {
        Ok(server) => {
            info!(
                "Stats server at http://localhost:{}/stats",
                DEFAULT_STATS_PORT
            );
            Some(server)
        }
        Err(e) => {
            warn!("Failed to start stats server: {}", e);
            None
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stats_timer = tokio::time::interval(STATS_LOG_INTERVAL);
    stats_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    stats_timer.tick().await; // Skip first

    info!("Reading advertisements from stdin (Ctrl+C to exit)...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }

            _ = stats_timer.tick() => {
                let stats = engine.stats();
                info!(
                    "Stats: {} received, {} duplicate ({:.0}%), {} completed, {} timed out, \
                     {} active",
                    stats.packets_received,
                    stats.packets_duplicate,
                    stats.duplicate_rate() * 100.0,
                    stats.streams_completed,
                    stats.streams_timeout,
                    stats.active_streams
                );
            }

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("End of input");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                };

                match parse_line(&line) {
                    None => {}
                    Some(Err(e)) => warn!("Skipping line: {}", e),
                    Some(Ok((device, payload))) => match engine.ingest(&device, &payload) {
                        Outcome::Invalid(e) => {
                            warn!("Invalid advertisement from {}: {}", device, e)
                        }
                        outcome => debug!("{}: {}", device, outcome),
                    },
                }

                // Measurements were already logged by the completion callback
                while engine.take_completed().is_some() {}
            }
        }
    }

    let stats = engine.stats();
    info!(
        "Shutdown complete: {} cycles completed, {} timed out",
        stats.streams_completed, stats.streams_timeout
    );
}
