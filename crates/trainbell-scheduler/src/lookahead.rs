//! Daily reminder: is there a training slot the day after tomorrow?

use chrono::{DateTime, NaiveDate, Utc};
use trainbell_core::{Notifier, Result, SlotQuery, SlotStore, SlotType};

use crate::jobs::JobSettings;
use crate::notify::NotificationKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookaheadOutcome {
    pub target: NaiveDate,
    pub notified: bool,
}

/// Send one reminder if at least one `Training` slot exists
/// `rules.lookahead_days` ahead. Never writes to the store.
pub async fn check_lookahead(
    store: &dyn SlotStore,
    notifier: &dyn Notifier,
    settings: &JobSettings,
    now: DateTime<Utc>,
) -> Result<LookaheadOutcome> {
    let target = settings.calendar.days_ahead(now, settings.rules.lookahead_days);
    tracing::info!("🔎 Looking for training slots on {target}");

    // Existence check only.
    let found = store.query(&SlotQuery::on(target, SlotType::Training).limit(1)).await?;
    if found.is_empty() {
        tracing::info!("No training slot on {target}");
        return Ok(LookaheadOutcome {
            target,
            notified: false,
        });
    }

    tracing::info!("📅 Training slot found on {target}, sending reminder");
    notifier.send(&settings.event(NotificationKind::Lookahead)).await?;
    Ok(LookaheadOutcome {
        target,
        notified: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNotifier, day, evening, settings};
    use trainbell_core::{TrainbellError, TrainingSlot};
    use trainbell_store::MemorySlotStore;

    #[tokio::test]
    async fn test_no_slot_two_days_out_sends_nothing() {
        // Tomorrow has training, two days out only self-training.
        let store = MemorySlotStore::with_slots([
            TrainingSlot::new("a", day(11), SlotType::Training),
            TrainingSlot::new("b", day(12), SlotType::SelfTraining),
        ]);
        let notifier = RecordingNotifier::default();

        let outcome = check_lookahead(&store, &notifier, &settings(), evening()).await.unwrap();
        assert_eq!(outcome.target, day(12));
        assert!(!outcome.notified);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_many_slots_send_exactly_one_reminder() {
        let store = MemorySlotStore::with_slots([
            TrainingSlot::new("a", day(12), SlotType::Training),
            TrainingSlot::new("b", day(12), SlotType::Training),
            TrainingSlot::new("c", day(12), SlotType::Training),
        ]);
        let notifier = RecordingNotifier::default();

        let outcome = check_lookahead(&store, &notifier, &settings(), evening()).await.unwrap();
        assert!(outcome.notified);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "後天有訓練記得登記");
        assert_eq!(sent[0].topic, "trainingNotice");
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_query_failure_propagates() {
        let store = MemorySlotStore::new();
        store.set_fail_queries(true);
        let notifier = RecordingNotifier::default();

        let err = check_lookahead(&store, &notifier, &settings(), evening()).await.unwrap_err();
        assert!(matches!(err, TrainbellError::StoreQuery(_)));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_propagates() {
        let store = MemorySlotStore::with_slots([TrainingSlot::new("a", day(12), SlotType::Training)]);
        let notifier = RecordingNotifier::failing();

        let err = check_lookahead(&store, &notifier, &settings(), evening()).await.unwrap_err();
        assert!(matches!(err, TrainbellError::NotificationDelivery(_)));
    }
}
