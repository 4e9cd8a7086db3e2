use crate::camera::SharedFrameSource;
use crate::error::{GuideError, GuideResult};
use crate::session::SessionEvent;
use std::time::Duration;
use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::*;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Feeds camera frames to the session while `running` is set.
///
/// Each frame is awaited until the session is done with it, so at most one
/// realtime request is in flight and slow responses skip ticks instead of
/// queueing frames.
pub fn start_capture_loop(
    frames: SharedFrameSource,
    interval: Duration,
    mut running: watch::Receiver<bool>,
    events: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()> {
    // tokio intervals panic on a zero period
    let interval = interval.max(MIN_INTERVAL);
    tokio::spawn(async move {
        loop {
            loop {
                let active = *running.borrow_and_update();
                if active {
                    break;
                }
                if running.changed().await.is_err() {
                    return;
                }
            }
            info!("Capture loop started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                select! {
                    _ = ticker.tick() => {
                        match capture_and_submit(&frames, &events).await {
                            Ok(()) => (),
                            Err(GuideError::SessionClosed) => {
                                info!("Session closed, stopping capture loop");
                                return;
                            }
                            Err(e) => warn!("Failed to capture frame: {}", e),
                        }
                    }
                    changed = running.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let active = *running.borrow_and_update();
                        if !active {
                            info!("Capture loop paused");
                            break;
                        }
                    }
                }
            }
        }
    })
}

async fn capture_and_submit(
    frames: &SharedFrameSource,
    events: &mpsc::Sender<SessionEvent>,
) -> GuideResult<()> {
    let frame = frames.grab().await?;
    trace!(bytes = frame.len(), "Captured frame");
    let (done, processed) = oneshot::channel();
    events
        .send(SessionEvent::Frame { frame, done })
        .await
        .map_err(|_| GuideError::SessionClosed)?;
    processed.await.map_err(|_| GuideError::SessionClosed)
}
