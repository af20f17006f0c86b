use std::{
    process,
    sync::{Arc, OnceLock},
};

use brokerlink::{config::Config, logger::LoggerManager, print_error};
use brokerlink_mqtt::{
    ConnectionManager, ConnectionState, ConnectionStateListener, DropReason, PublishOutcome,
    QueueBackpressureListener,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
};
use tracing::{debug, error, info, trace, warn};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

/// Reports lifecycle events the manager does not log itself.
struct LifecycleReporter;

impl ConnectionStateListener for LifecycleReporter {
    fn on_connection_state_change(&self, state: ConnectionState) {
        debug!("Connection state is now {}", state);
    }

    fn on_authentication_failure(&self, client_id: &str) {
        error!(
            "Broker rejected credentials for client '{}'; not reconnecting",
            client_id
        );
    }
}

/// Flips the reader's pause flag on backpressure edges.
struct ReaderThrottle {
    paused: watch::Sender<bool>,
}

impl QueueBackpressureListener for ReaderThrottle {
    fn on_queue_full(&self, pending: usize, limit: usize) {
        info!("Pausing input: {}/{} publishes pending", pending, limit);
        self.paused.send_replace(true);
    }

    fn on_queue_drained(&self, pending: usize, limit: usize) {
        info!("Resuming input: {}/{} publishes pending", pending, limit);
        self.paused.send_replace(false);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting brokerlink version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.mqtt);

    let info = cfg.mqtt.connection_info().unwrap_or_else(|e| {
        error!("Invalid broker configuration: {}", e);
        process::exit(1);
    });
    let manager = ConnectionManager::from_config(&cfg.mqtt).unwrap_or_else(|e| {
        error!("Failed to create ConnectionManager: {}", e);
        process::exit(1);
    });

    let (paused_tx, mut paused_rx) = watch::channel(false);
    manager.register_state_listener(Arc::new(LifecycleReporter));
    manager.register_backpressure_listener(Arc::new(ReaderThrottle { paused: paused_tx }));

    info!(
        "Connecting to {} as '{}' (queue limit {})",
        info.broker_uri(),
        info.client_id(),
        manager.queue_limit()
    );
    manager.connect(info).await;

    let topic = cfg.producer.topic.as_str();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut forwarded: u64 = 0;
    let mut dropped: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
                break;
            }
            resumed = paused_rx.wait_for(|paused| !*paused) => {
                if resumed.is_err() {
                    break;
                }
            }
        }

        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
                break;
            }
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => match manager.publish(topic, line) {
                PublishOutcome::Forwarded => {
                    forwarded += 1;
                    trace!("Forwarded line {}", forwarded);
                }
                PublishOutcome::Dropped(DropReason::QueueFull) => dropped += 1,
                PublishOutcome::Dropped(reason) => {
                    dropped += 1;
                    debug!("Dropped line while {:?}", reason);
                }
            },
            Ok(None) => {
                info!("End of input");
                break;
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    manager.disconnect().await;
    if dropped > 0 {
        warn!("{} lines were dropped", dropped);
    }
    info!("Shutdown complete: {} lines forwarded", forwarded);
    Ok(())
}
