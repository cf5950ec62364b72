use std::sync::Arc;

use anyhow::Result;
use common::physical::{Color, Direction, Sound};
use duplo_hub_driver::{
    externals::{ble::central::BtleplugTransport, event_logging::task::task_hub_event_logging},
    models::hub_event::HubEvent,
    train::{ports, DuploTrain},
};
use tokio::{signal, sync::broadcast::error::RecvError};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, level_filters::LevelFilter, warn};

const CRUISE_POWER: f32 = 50.0;
const STOP_COLOR: Color = Color::Red;

/// Task: Drives the train forward until it passes over `STOP_COLOR`, then
/// stops and sounds the horn. Can be cancelled.
#[tracing::instrument(skip_all)]
async fn task_drive_until_color(token: CancellationToken, train: Arc<DuploTrain>) {
    info!("Started.");
    let mut rx_events = train.hub().subscribe_events();

    tokio::select! {
        _ = token.cancelled() => {
            warn!("Cancelled.");
            return;
        },
        attached = train.hub().wait_for_port(ports::MOTOR) => {
            if let Err(e) = attached {
                error!("The motor never attached. Error: {}", e);
                token.cancel();
                return;
            }
        },
    }

    if let Err(e) = train.run(Direction::Forward, CRUISE_POWER).await {
        error!("Failed to start the motor. Error: {}", e);
        token.cancel();
        return;
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            event = rx_events.recv() => match event {
                Ok(HubEvent::ReadingUpdated(_)) if train.is_color(STOP_COLOR) => {
                    info!("Reached {} after {} units.", STOP_COLOR, train.driving_distance());
                    if let Err(e) = train.stop().await {
                        error!("Failed to stop. Error: {}", e);
                    }
                    if let Err(e) = train.play_sound(Sound::Horn).await {
                        warn!("Failed to sound the horn. Error: {}", e);
                    }
                    token.cancel();
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!("Missed {} hub events.", missed),
                Err(RecvError::Closed) => {
                    token.cancel();
                    break;
                }
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_max_level(LevelFilter::DEBUG)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    let tracker = TaskTracker::new();

    let token = CancellationToken::new();

    let train = Arc::new(DuploTrain::new(Arc::new(BtleplugTransport::new())));

    let token_clone = token.clone();
    let events = train.hub().events();
    tracker.spawn(async { task_hub_event_logging(token_clone, events).await });

    train.connect().await?;

    let token_clone = token.clone();
    let train_clone = train.clone();
    tracker.spawn(async { task_drive_until_color(token_clone, train_clone).await });

    let token_clone = token.clone();

    tokio::select! {
        _ = token_clone.cancelled() => {}
        res = signal::ctrl_c() => {
            match res {
                Ok(_) => {
                    if let Err(e) = train.stop().await {
                        warn!("Failed to stop before exiting. Error: {}", e);
                    }
                    token.cancel();
                },
                Err(e) => {
                    error!("Failed to listen for ctrl_c. Error: {}", e);
                    token.cancel();
                }
            };
        },
    }

    tracker.close();
    tracker.wait().await;
    train.disconnect().await;

    Ok(())
}
