use crate::domain::message::Message;
use opentelemetry::{KeyValue, global, metrics::Counter};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    armed_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            armed_total: meter
                .u64_counter("courier_lifecycle_timers_armed_total")
                .with_description("Single-shot lifecycle timers handed to the worker, by outcome")
                .build(),
        }
    }
}

/// One exact-instant lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerJob {
    Release { message_id: Uuid, at: OffsetDateTime },
    Retire { message_id: Uuid, at: OffsetDateTime },
}

impl TimerJob {
    #[must_use]
    pub const fn at(&self) -> OffsetDateTime {
        match self {
            Self::Release { at, .. } | Self::Retire { at, .. } => *at,
        }
    }

    #[must_use]
    pub const fn message_id(&self) -> Uuid {
        match self {
            Self::Release { message_id, .. } | Self::Retire { message_id, .. } => *message_id,
        }
    }
}

/// Hands single-shot timers to the lifecycle worker. Best effort: anything not armed here is
/// still picked up by the interval sweep.
#[derive(Clone, Debug)]
pub struct LifecycleTimers {
    tx: mpsc::Sender<TimerJob>,
    horizon: time::Duration,
    metrics: Metrics,
}

impl LifecycleTimers {
    #[must_use]
    pub fn new(capacity: usize, horizon: std::time::Duration) -> (Self, mpsc::Receiver<TimerJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let horizon = time::Duration::try_from(horizon).unwrap_or(time::Duration::ZERO);
        (Self { tx, horizon, metrics: Metrics::new() }, rx)
    }

    /// Arms whatever pending transitions `message` still has.
    pub fn arm_for(&self, message: &Message, now: OffsetDateTime) {
        if message.is_scheduled
            && let Some(at) = message.scheduled_at
        {
            self.arm(TimerJob::Release { message_id: message.id, at }, now);
        }
        if message.is_burnout
            && let Some(at) = message.expire_at
        {
            self.arm(TimerJob::Retire { message_id: message.id, at }, now);
        }
    }

    /// Returns `true` if the job was queued.
    pub fn arm(&self, job: TimerJob, now: OffsetDateTime) -> bool {
        if job.at() - now > self.horizon {
            self.metrics.armed_total.add(1, &[KeyValue::new("outcome", "beyond_horizon")]);
            return false;
        }

        match self.tx.try_send(job) {
            Ok(()) => {
                self.metrics.armed_total.add(1, &[KeyValue::new("outcome", "armed")]);
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(message.id = %job.message_id(), "Timer queue full, leaving message to the sweep");
                self.metrics.armed_total.add(1, &[KeyValue::new("outcome", "queue_full")]);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn jobs_beyond_the_horizon_are_left_to_the_sweep() {
        let (timers, mut rx) = LifecycleTimers::new(4, std::time::Duration::from_secs(60));
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();

        assert!(!timers.arm(TimerJob::Release { message_id: id, at: now + Duration::minutes(5) }, now));
        assert!(timers.arm(TimerJob::Retire { message_id: id, at: now + Duration::seconds(30) }, now));

        assert_eq!(rx.try_recv().map(|job| job.message_id()), Ok(id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_does_not_block() {
        let (timers, _rx) = LifecycleTimers::new(1, std::time::Duration::from_secs(60));
        let now = OffsetDateTime::now_utc();
        let job = TimerJob::Release { message_id: Uuid::new_v4(), at: now };

        assert!(timers.arm(job, now));
        assert!(!timers.arm(job, now));
    }
}
