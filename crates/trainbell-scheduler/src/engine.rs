//! Scheduler engine — fires the daily checks and drains the change feed.
//! Uses tokio::interval for ticking (sleeps between checks).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use trainbell_core::config::ScheduleConfig;
use trainbell_core::{ChangeFeed, ReferenceCalendar, Result};

use crate::cron::CronSchedule;
use crate::jobs::{JobKind, JobReport, SlotJobs};
use crate::recovery::RecoveryOutcome;

/// One daily check and its next firing time in the reference offset.
#[derive(Debug, Clone)]
pub struct DailyJob {
    pub kind: JobKind,
    pub schedule: CronSchedule,
    pub next_run: Option<DateTime<FixedOffset>>,
}

/// Decides which daily checks are due.
pub struct SchedulerEngine {
    jobs: Vec<DailyJob>,
    calendar: ReferenceCalendar,
}

impl SchedulerEngine {
    /// Build the engine; the first firing of each job is computed from `now`.
    pub fn new(schedule: &ScheduleConfig, calendar: ReferenceCalendar, now: DateTime<Utc>) -> Result<Self> {
        let local = calendar.local(now);
        let mut jobs = Vec::new();
        for (kind, expression) in [
            (JobKind::Lookahead, &schedule.lookahead_cron),
            (JobKind::Capacity, &schedule.capacity_cron),
        ] {
            let schedule = CronSchedule::parse(expression)?;
            let next_run = schedule.next_after(local);
            jobs.push(DailyJob {
                kind,
                schedule,
                next_run,
            });
        }
        Ok(Self { jobs, calendar })
    }

    pub fn jobs(&self) -> &[DailyJob] {
        &self.jobs
    }

    /// Jobs due at `now`. Each due job is rescheduled from `now`, so a
    /// missed firing runs once, not once per missed day.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<JobKind> {
        let local = self.calendar.local(now);
        let mut due = Vec::new();
        for job in self.jobs.iter_mut() {
            if job.next_run.is_some_and(|at| at <= local) {
                tracing::info!("🔔 Job '{}' triggered ({})", job.kind, job.schedule.expression());
                due.push(job.kind);
                job.next_run = job.schedule.next_after(local);
            }
        }
        due
    }
}

/// Spawn the scheduler loop as a background tokio task.
/// Every due job runs as its own task; a failure is logged and the loop
/// keeps going.
pub async fn spawn_scheduler(mut engine: SchedulerEngine, jobs: Arc<SlotJobs>, check_interval_secs: u64) {
    tracing::info!("⏰ Scheduler started (check every {}s)", check_interval_secs);

    let mut interval = tokio::time::interval(Duration::from_secs(check_interval_secs.max(1)));

    loop {
        interval.tick().await;

        let now = Utc::now();
        for kind in engine.tick(now) {
            let jobs = jobs.clone();
            tokio::spawn(async move {
                match jobs.run(kind, now).await {
                    Ok(JobReport::Lookahead(outcome)) => {
                        tracing::info!("✅ lookahead for {}: notified={}", outcome.target, outcome.notified);
                    }
                    Ok(JobReport::Capacity(outcome)) => {
                        tracing::info!(
                            "✅ capacity for {}: {} scanned, {} demoted, notified={}",
                            outcome.target,
                            outcome.scanned,
                            outcome.demoted.len(),
                            outcome.notified
                        );
                    }
                    Err(e) => tracing::error!("❌ Job '{kind}' failed ({}): {e}", e.kind()),
                }
            });
        }
    }
}

/// What one pass over the change feed did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Changes handled and acknowledged.
    pub handled: usize,
    pub promoted: usize,
    /// Changes given up on after too many attempts.
    pub dropped: usize,
    /// The pass stopped at a failing change that will be retried.
    pub stalled: bool,
}

/// Handle up to `batch` pending changes, oldest first.
///
/// A handled change is acked. A failing one is counted; once it has failed
/// `max_attempts` times it is dropped, otherwise the pass stops there so
/// later changes are not handled before it.
pub async fn drain_changes(
    feed: &dyn ChangeFeed,
    jobs: &SlotJobs,
    batch: usize,
    max_attempts: u32,
) -> Result<DrainReport> {
    let mut report = DrainReport::default();
    for change in feed.poll(batch).await? {
        match jobs.on_change(&change).await {
            Ok(outcome) => {
                feed.ack(change.seq).await?;
                report.handled += 1;
                if matches!(outcome, RecoveryOutcome::Promoted { .. }) {
                    report.promoted += 1;
                }
            }
            Err(e) => {
                let attempts = feed.fail(change.seq).await?;
                if attempts >= max_attempts {
                    tracing::error!(
                        "❌ Change #{} of slot {} dropped after {attempts} attempts ({}): {e}",
                        change.seq,
                        change.slot_id,
                        e.kind()
                    );
                    feed.ack(change.seq).await?;
                    report.dropped += 1;
                } else {
                    tracing::warn!(
                        "⚠️ Change #{} of slot {} failed (attempt {attempts}/{max_attempts}, {}): {e}",
                        change.seq,
                        change.slot_id,
                        e.kind()
                    );
                    report.stalled = true;
                    break;
                }
            }
        }
    }
    Ok(report)
}

/// Spawn the change watcher as a background tokio task.
pub async fn spawn_change_watcher(
    feed: Arc<dyn ChangeFeed>,
    jobs: Arc<SlotJobs>,
    poll_interval_secs: u64,
    batch: usize,
    max_attempts: u32,
) {
    tracing::info!("👀 Change watcher started (poll every {}s)", poll_interval_secs);

    let mut interval = tokio::time::interval(Duration::from_secs(poll_interval_secs.max(1)));

    loop {
        interval.tick().await;
        match drain_changes(feed.as_ref(), &jobs, batch, max_attempts).await {
            Ok(report) if report.handled > 0 || report.dropped > 0 => {
                tracing::info!(
                    "Change feed: {} handled, {} promoted, {} dropped",
                    report.handled,
                    report.promoted,
                    report.dropped
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!("❌ Change feed unavailable ({}): {e}", e.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNotifier, day, evening, settings};
    use chrono::TimeZone;
    use trainbell_core::{SlotId, SlotType, TrainingSlot};
    use trainbell_store::MemorySlotStore;

    fn engine_at(now: DateTime<Utc>) -> SchedulerEngine {
        SchedulerEngine::new(&ScheduleConfig::default(), ReferenceCalendar::taipei(), now).unwrap()
    }

    #[test]
    fn test_fires_at_evening_in_reference_offset() {
        // 09:00 Taipei.
        let morning = Utc.with_ymd_and_hms(2026, 3, 10, 1, 0, 0).unwrap();
        let mut engine = engine_at(morning);
        assert!(engine.tick(morning).is_empty());

        // 17:59 Taipei: not yet.
        assert!(engine.tick(Utc.with_ymd_and_hms(2026, 3, 10, 9, 59, 0).unwrap()).is_empty());

        let due = engine.tick(evening());
        assert_eq!(due, vec![JobKind::Lookahead, JobKind::Capacity]);
        // Once per day.
        assert!(engine.tick(evening() + chrono::Duration::minutes(5)).is_empty());
        let next = engine.jobs()[0].next_run.unwrap();
        assert_eq!(next.naive_local().date(), day(11));
    }

    #[test]
    fn test_missed_firings_run_once() {
        let mut engine = engine_at(evening() - chrono::Duration::hours(1));
        let three_days_later = evening() + chrono::Duration::days(3);
        assert_eq!(engine.tick(three_days_later).len(), 2);
        assert!(engine.tick(three_days_later).is_empty());
    }

    #[test]
    fn test_bad_cron_rejected() {
        let schedule = ScheduleConfig {
            capacity_cron: "whenever".into(),
            ..ScheduleConfig::default()
        };
        assert!(SchedulerEngine::new(&schedule, ReferenceCalendar::taipei(), evening()).is_err());
    }

    fn wired(store: Arc<MemorySlotStore>, notifier: Arc<RecordingNotifier>) -> SlotJobs {
        SlotJobs::new(store, notifier, settings(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_drain_promotes_and_skips_own_write() {
        let store = Arc::new(MemorySlotStore::with_slots([TrainingSlot::new(
            "s1",
            day(11),
            SlotType::SelfTraining,
        )
        .with_participants(["a", "b"])]));
        let notifier = Arc::new(RecordingNotifier::default());
        let jobs = wired(store.clone(), notifier.clone());

        store.set_participants(&SlotId::from("s1"), ["a", "b", "c"]).await.unwrap();
        let report = drain_changes(store.as_ref(), &jobs, 10, 3).await.unwrap();
        assert_eq!(report.handled, 1);
        assert_eq!(report.promoted, 1);
        assert_eq!(notifier.sent().len(), 1);

        // The promotion itself is fed back; participants unchanged, no notice.
        assert_eq!(store.pending_changes().await, 1);
        let report = drain_changes(store.as_ref(), &jobs, 10, 3).await.unwrap();
        assert_eq!(report.handled, 1);
        assert_eq!(report.promoted, 0);
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(store.pending_changes().await, 0);
    }

    #[tokio::test]
    async fn test_failing_change_retried_then_dropped() {
        let store = Arc::new(MemorySlotStore::with_slots([TrainingSlot::new(
            "s1",
            day(11),
            SlotType::SelfTraining,
        )]));
        let notifier = Arc::new(RecordingNotifier::default());
        let jobs = wired(store.clone(), notifier.clone());

        store.set_participants(&SlotId::from("s1"), ["a", "b", "c"]).await.unwrap();
        store.set_fail_mutations(true);

        let report = drain_changes(store.as_ref(), &jobs, 10, 2).await.unwrap();
        assert!(report.stalled);
        assert_eq!(report.handled, 0);
        assert_eq!(store.pending_changes().await, 1);

        let report = drain_changes(store.as_ref(), &jobs, 10, 2).await.unwrap();
        assert!(!report.stalled);
        assert_eq!(report.dropped, 1);
        assert_eq!(store.pending_changes().await, 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_change_reaches_same_decision() {
        let store = Arc::new(MemorySlotStore::with_slots([TrainingSlot::new(
            "s1",
            day(11),
            SlotType::SelfTraining,
        )]));
        let notifier = Arc::new(RecordingNotifier::default());
        let jobs = wired(store.clone(), notifier.clone());

        store.set_participants(&SlotId::from("s1"), ["a", "b", "c"]).await.unwrap();
        let change = store.poll(1).await.unwrap().remove(0);
        // Handled twice (e.g. crash before ack): same outcome both times.
        let first = jobs.on_change(&change).await.unwrap();
        let second = jobs.on_change(&change).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.get(&SlotId::from("s1")).await.unwrap().slot_type, SlotType::Training);
    }
}
