use crate::services::lifecycle_service::LifecycleService;
use crate::services::timers::TimerJob;
use futures::StreamExt;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio_util::time::DelayQueue;
use tracing::Instrument;

/// Drives the lifecycle service: an interval sweep plus the single-shot timers armed by the
/// delivery path.
#[derive(Debug)]
pub struct LifecycleWorker {
    service: LifecycleService,
    timer_rx: Option<mpsc::Receiver<TimerJob>>,
}

impl LifecycleWorker {
    #[must_use]
    pub const fn new(service: LifecycleService, timer_rx: Option<mpsc::Receiver<TimerJob>>) -> Self {
        Self { service, timer_rx }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self { service, mut timer_rx } = self;
        let mut interval = tokio::time::interval(Duration::from_secs(service.config().sweep_interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut timers: DelayQueue<TimerJob> = DelayQueue::new();

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    let now = OffsetDateTime::now_utc();
                    if let Err(e) = service.sweep(now)
                        .instrument(tracing::info_span!("lifecycle_sweep_iteration"))
                        .await
                    {
                        tracing::error!(error = ?e, "Lifecycle sweep failed");
                    }
                }

                job = recv_job(&mut timer_rx) => {
                    match job {
                        Some(job) => {
                            let delay = (job.at() - OffsetDateTime::now_utc()).try_into().unwrap_or(Duration::ZERO);
                            timers.insert(job, delay);
                        }
                        None => timer_rx = None,
                    }
                }

                Some(expired) = timers.next(), if !timers.is_empty() => {
                    let job = expired.into_inner();
                    if let Err(e) = service.fire(job, OffsetDateTime::now_utc()).await {
                        tracing::warn!(
                            error = %e,
                            message.id = %job.message_id(),
                            "Timer transition failed, leaving it to the sweep"
                        );
                    }
                }

                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Lifecycle loop shutting down...");
    }
}

/// Waits for the next armed timer, or forever once timers are disabled or the sender is gone.
async fn recv_job(rx: &mut Option<mpsc::Receiver<TimerJob>>) -> Option<TimerJob> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
