use crate::adapters::store::{Directory, MessageStore};
use crate::config::LifecycleConfig;
use crate::domain::gateway::{MessageExpired, ServerEvent};
use crate::domain::message::{Destination, Message};
use crate::error::Result;
use crate::services::delivery_service::DeliveryService;
use crate::services::presence::PresenceRegistry;
use crate::services::projector::ConversationProjector;
use crate::services::timers::TimerJob;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sweep_duration: Histogram<f64>,
    released_total: Counter<u64>,
    expired_total: Counter<u64>,
    timer_fired_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            sweep_duration: meter
                .f64_histogram("courier_lifecycle_sweep_duration_seconds")
                .with_description("Time spent in one lifecycle sweep")
                .with_unit("s")
                .build(),
            released_total: meter
                .u64_counter("courier_scheduled_released_total")
                .with_description("Scheduled messages released for delivery")
                .build(),
            expired_total: meter
                .u64_counter("courier_burnout_expired_total")
                .with_description("Burnout messages retired at their deadline")
                .build(),
            timer_fired_total: meter
                .u64_counter("courier_lifecycle_timer_fired_total")
                .with_description("Single-shot lifecycle timers fired, by kind")
                .build(),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub released: usize,
    pub expired: usize,
    pub failed: usize,
}

/// Moves scheduled messages to sent and burnout messages to expired.
///
/// Every transition starts with a conditional store update, so a message is released or
/// retired at most once no matter how many sweeps and timers race for it.
#[derive(Clone, Debug)]
pub struct LifecycleService {
    directory: Arc<dyn Directory>,
    messages: Arc<dyn MessageStore>,
    delivery: DeliveryService,
    presence: PresenceRegistry,
    projector: ConversationProjector,
    config: LifecycleConfig,
    /// Conversations whose projection failed after a transition landed. The next sweep retries them.
    stale: Arc<Mutex<BTreeSet<Uuid>>>,
    metrics: Metrics,
}

impl LifecycleService {
    #[must_use]
    pub fn new(
        directory: Arc<dyn Directory>,
        messages: Arc<dyn MessageStore>,
        delivery: DeliveryService,
        presence: PresenceRegistry,
        projector: ConversationProjector,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            directory,
            messages,
            delivery,
            presence,
            projector,
            config,
            stale: Arc::new(Mutex::new(BTreeSet::new())),
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Runs one sweep as of `now`: every due send first, then every due expiry, then one
    /// projection per touched conversation, including any left stale by an earlier failure. A
    /// failing message is logged and does not stop the batch.
    ///
    /// # Errors
    /// Returns `AppError::Database` if a due-selection query fails. Transitions that already
    /// landed in this sweep are still projected first.
    #[tracing::instrument(
        skip(self, now),
        err,
        fields(released = tracing::field::Empty, expired = tracing::field::Empty, failed = tracing::field::Empty)
    )]
    pub async fn sweep(&self, now: OffsetDateTime) -> Result<SweepReport> {
        let started = std::time::Instant::now();
        let mut report = SweepReport::default();
        let mut touched = std::mem::take(&mut *self.stale.lock());

        let mut selection = self.release_due(now, &mut report, &mut touched).await;
        // Expiries wait for sends so a message due for both is released before it is retired.
        if selection.is_ok() {
            selection = self.retire_due(now, &mut report, &mut touched).await;
        }

        for conversation_id in touched {
            // Failures are logged and queued for the next sweep.
            let _ = self.project_or_mark_stale(conversation_id, now).await;
        }

        self.metrics.sweep_duration.record(started.elapsed().as_secs_f64(), &[]);
        let span = tracing::Span::current();
        span.record("released", report.released);
        span.record("expired", report.expired);
        span.record("failed", report.failed);
        if report.released > 0 || report.expired > 0 {
            tracing::info!(released = report.released, expired = report.expired, "Lifecycle sweep finished");
        }
        selection.map(|()| report)
    }

    async fn release_due(
        &self,
        now: OffsetDateTime,
        report: &mut SweepReport,
        touched: &mut BTreeSet<Uuid>,
    ) -> Result<()> {
        for message in self.messages.due_scheduled(now, self.config.batch_limit).await? {
            match self.release_scheduled(message.id(), now).await {
                Ok(Some(conversation_id)) => {
                    report.released += 1;
                    touched.insert(conversation_id);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        message.id = %message.id(),
                        "Scheduled release failed, retrying next sweep"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn retire_due(
        &self,
        now: OffsetDateTime,
        report: &mut SweepReport,
        touched: &mut BTreeSet<Uuid>,
    ) -> Result<()> {
        for message in self.messages.due_expired(now, self.config.batch_limit).await? {
            match self.retire_expired(message.id(), now).await {
                Ok(Some(conversation_id)) => {
                    report.expired += 1;
                    touched.insert(conversation_id);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        message.id = %message.id(),
                        "Burnout expiry failed, retrying next sweep"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn project_or_mark_stale(&self, conversation_id: Uuid, now: OffsetDateTime) -> Result<()> {
        let result = self.projector.project(conversation_id, now).await;
        if let Err(e) = &result {
            tracing::warn!(
                error = %e,
                conversation.id = %conversation_id,
                "Failed to update conversation preview, retrying next sweep"
            );
            self.stale.lock().insert(conversation_id);
        }
        result.map(|_| ())
    }

    /// Claims a due scheduled message and pushes it. Returns the conversation to re-project, or
    /// `None` if someone else already claimed it or it is not due.
    ///
    /// Once the claim has landed the message counts as sent even if the push fails, so broken
    /// data never causes a resend loop.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the claim itself fails; the message stays pending.
    pub async fn release_scheduled(&self, message_id: Uuid, now: OffsetDateTime) -> Result<Option<Uuid>> {
        let Some(message) = self.messages.claim_scheduled(message_id, now).await? else {
            return Ok(None);
        };

        match self.delivery.release(&message).await {
            Ok(reached) => tracing::debug!(message.id = %message_id, reached, "Scheduled message released"),
            Err(e) => {
                tracing::warn!(error = %e, message.id = %message_id, "Released scheduled message could not be pushed");
            }
        }
        self.metrics.released_total.add(1, &[]);
        Ok(Some(message.conversation_id()))
    }

    /// Retires a due burnout message and tells every reachable participant. Returns the
    /// conversation to re-project, or `None` if there was nothing to retire.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the expiry write fails; the message stays pending.
    pub async fn retire_expired(&self, message_id: Uuid, now: OffsetDateTime) -> Result<Option<Uuid>> {
        let Some(message) = self.messages.expire(message_id, now).await? else {
            return Ok(None);
        };

        let event = MessageExpired { message_id, group_id: message.destination.group_id() };
        for user_id in self.expiry_audience(&message).await {
            self.presence.push_to(user_id, ServerEvent::MessageExpired(event.clone()));
        }
        self.metrics.expired_total.add(1, &[]);
        tracing::debug!(message.id = %message_id, "Burnout message expired");
        Ok(Some(message.conversation_id()))
    }

    async fn expiry_audience(&self, message: &Message) -> Vec<Uuid> {
        let mut audience = vec![message.sender_id];
        match message.destination {
            Destination::Direct { recipient_id } => audience.push(recipient_id),
            Destination::Group { group_id } => match self.directory.find_group(group_id).await {
                Ok(Some(group)) => audience.extend(group.members),
                Ok(None) => tracing::warn!(group.id = %group_id, "Group of expired message no longer exists"),
                Err(e) => tracing::warn!(error = %e, group.id = %group_id, "Failed to resolve group for expiry notice"),
            },
        }
        audience.sort_unstable();
        audience.dedup();
        audience
    }

    /// Handles a single-shot timer. The sweep remains the fallback if this fails.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the transition or the projection fails.
    #[tracing::instrument(level = "debug", skip(self, now), err)]
    pub async fn fire(&self, job: TimerJob, now: OffsetDateTime) -> Result<()> {
        // The wall clock can trail the monotonic deadline by a fraction of a millisecond.
        let now = now.max(job.at());
        let (kind, touched) = match job {
            TimerJob::Release { message_id, .. } => ("release", self.release_scheduled(message_id, now).await?),
            TimerJob::Retire { message_id, .. } => ("retire", self.retire_expired(message_id, now).await?),
        };
        self.metrics.timer_fired_total.add(1, &[KeyValue::new("kind", kind)]);

        match touched {
            Some(conversation_id) => self.project_or_mark_stale(conversation_id, now).await,
            None => Ok(()),
        }
    }
}
