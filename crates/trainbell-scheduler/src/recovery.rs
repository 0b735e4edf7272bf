//! Recovery watcher: a self-training slot that regains enough participants
//! goes back to training.
//!
//! Decisions come from the before/after pair alone, so handling the same
//! change twice reaches the same decision.

use trainbell_core::{Notifier, Result, SlotStore, SlotType, SlotUpdate, TrainingSlot};

use crate::jobs::JobSettings;
use crate::notify::NotificationKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Participant set identical; some other field was edited.
    Unchanged,
    /// Participants changed but the promotion rule does not apply.
    NotEligible {
        before_type: SlotType,
        after_count: usize,
    },
    /// Slot set back to training and the recovery notice sent.
    Promoted { after_count: usize },
}

/// Whether the participant sets differ, ignoring order and duplicates.
///
/// Changed iff the sizes differ or some `before` member is missing from
/// `after`.
pub fn participants_changed(before: &TrainingSlot, after: &TrainingSlot) -> bool {
    let before_set = before.participant_set();
    let after_set = after.participant_set();
    before_set.len() != after_set.len() || !before_set.is_subset(&after_set)
}

/// The decision without side effects.
pub fn evaluate(before: &TrainingSlot, after: &TrainingSlot, promotion_threshold: usize) -> RecoveryOutcome {
    if !participants_changed(before, after) {
        return RecoveryOutcome::Unchanged;
    }
    let after_count = after.participant_count();
    if before.slot_type == SlotType::SelfTraining && after_count >= promotion_threshold {
        RecoveryOutcome::Promoted { after_count }
    } else {
        RecoveryOutcome::NotEligible {
            before_type: before.slot_type,
            after_count,
        }
    }
}

/// React to one update of one slot.
///
/// Promotion writes the `after` record, then notifies; the notice is only
/// sent once the write succeeded.
pub async fn handle_change(
    store: &dyn SlotStore,
    notifier: &dyn Notifier,
    settings: &JobSettings,
    before: &TrainingSlot,
    after: &TrainingSlot,
) -> Result<RecoveryOutcome> {
    let slot_id = &after.id;
    let outcome = evaluate(before, after, settings.rules.promotion_threshold);
    match &outcome {
        RecoveryOutcome::Unchanged => {
            tracing::debug!("Slot {slot_id} updated, participants unchanged, skipping");
        }
        RecoveryOutcome::NotEligible {
            before_type,
            after_count,
        } => {
            tracing::info!(
                "Slot {slot_id} participants {} -> {}, no recovery (was {before_type}, now {after_count})",
                before.participant_count(),
                after_count
            );
        }
        RecoveryOutcome::Promoted { after_count } => {
            tracing::info!("⬆️ Slot {slot_id} back to training ({after_count} participants)");
            store
                .mutate(&SlotUpdate::set_type(slot_id.clone(), SlotType::Training))
                .await?;
            notifier.send(&settings.event(NotificationKind::Recovery)).await?;
            tracing::info!("✅ Slot {slot_id} restored to training");
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNotifier, day, settings};
    use trainbell_core::{SlotId, TrainbellError};
    use trainbell_store::MemorySlotStore;

    fn slot(slot_type: SlotType, people: &[&str]) -> TrainingSlot {
        TrainingSlot::new("s1", day(11), slot_type).with_participants(people.iter().copied())
    }

    #[test]
    fn test_change_detection_ignores_order_and_duplicates() {
        let ab = slot(SlotType::Training, &["a", "b"]);
        assert!(!participants_changed(&ab, &slot(SlotType::Training, &["b", "a"])));
        assert!(!participants_changed(&ab, &slot(SlotType::SelfTraining, &["a", "b", "a"])));
        assert!(participants_changed(&ab, &slot(SlotType::Training, &["a", "b", "c"])));
        assert!(participants_changed(&ab, &slot(SlotType::Training, &["a"])));
        // Same size, different member.
        assert!(participants_changed(&ab, &slot(SlotType::Training, &["a", "c"])));
    }

    #[test]
    fn test_hysteresis_band() {
        let before = slot(SlotType::SelfTraining, &["a"]);
        // Two participants would be demoted again, so no promotion.
        assert_eq!(
            evaluate(&before, &slot(SlotType::SelfTraining, &["a", "b"]), 3),
            RecoveryOutcome::NotEligible {
                before_type: SlotType::SelfTraining,
                after_count: 2
            }
        );
        assert_eq!(
            evaluate(&before, &slot(SlotType::SelfTraining, &["a", "b", "c"]), 3),
            RecoveryOutcome::Promoted { after_count: 3 }
        );
    }

    #[tokio::test]
    async fn test_gaining_third_participant_promotes() {
        let before = slot(SlotType::SelfTraining, &["a", "b"]);
        let after = slot(SlotType::SelfTraining, &["a", "b", "c"]);
        let store = MemorySlotStore::with_slots([after.clone()]);
        let notifier = RecordingNotifier::default();

        let outcome = handle_change(&store, &notifier, &settings(), &before, &after).await.unwrap();
        assert_eq!(outcome, RecoveryOutcome::Promoted { after_count: 3 });
        assert_eq!(store.writes(), 1);
        assert_eq!(store.get(&SlotId::from("s1")).await.unwrap().slot_type, SlotType::Training);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "已恢復訓練");
    }

    #[tokio::test]
    async fn test_shrinking_set_still_at_threshold_promotes() {
        let before = slot(SlotType::SelfTraining, &["a", "b", "c", "d"]);
        let after = slot(SlotType::SelfTraining, &["a", "b", "c"]);
        let store = MemorySlotStore::with_slots([after.clone()]);
        let notifier = RecordingNotifier::default();

        let outcome = handle_change(&store, &notifier, &settings(), &before, &after).await.unwrap();
        assert_eq!(outcome, RecoveryOutcome::Promoted { after_count: 3 });
        assert_eq!(store.writes(), 1);
        assert_eq!(store.get(&SlotId::from("s1")).await.unwrap().slot_type, SlotType::Training);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "已恢復訓練");
    }

    #[tokio::test]
    async fn test_same_size_replacement_promotes() {
        let before = slot(SlotType::SelfTraining, &["a", "b", "c"]);
        let after = slot(SlotType::SelfTraining, &["a", "b", "d"]);
        let store = MemorySlotStore::with_slots([after.clone()]);
        let notifier = RecordingNotifier::default();

        let outcome = handle_change(&store, &notifier, &settings(), &before, &after).await.unwrap();
        assert_eq!(outcome, RecoveryOutcome::Promoted { after_count: 3 });
        assert_eq!(store.writes(), 1);
        assert_eq!(store.get(&SlotId::from("s1")).await.unwrap().slot_type, SlotType::Training);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "已恢復訓練");
    }

    #[tokio::test]
    async fn test_reordered_participants_do_nothing() {
        // Type differs between the snapshots, but participants are the same set.
        let before = slot(SlotType::SelfTraining, &["a", "b", "c"]);
        let after = slot(SlotType::Training, &["c", "b", "a", "a"]);
        let store = MemorySlotStore::with_slots([after.clone()]);
        let notifier = RecordingNotifier::default();

        let outcome = handle_change(&store, &notifier, &settings(), &before, &after).await.unwrap();
        assert_eq!(outcome, RecoveryOutcome::Unchanged);
        assert_eq!(store.writes(), 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_training_slot_is_never_promoted() {
        let before = slot(SlotType::Training, &["a"]);
        let after = slot(SlotType::Training, &["a", "b", "c", "d"]);
        let store = MemorySlotStore::with_slots([after.clone()]);
        let notifier = RecordingNotifier::default();

        let outcome = handle_change(&store, &notifier, &settings(), &before, &after).await.unwrap();
        assert!(matches!(outcome, RecoveryOutcome::NotEligible { .. }));
        assert_eq!(store.writes(), 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_too_few_participants_do_nothing() {
        let before = slot(SlotType::SelfTraining, &["a"]);
        let after = slot(SlotType::SelfTraining, &["a", "b", "b"]);
        let store = MemorySlotStore::with_slots([after.clone()]);
        let notifier = RecordingNotifier::default();

        let outcome = handle_change(&store, &notifier, &settings(), &before, &after).await.unwrap();
        assert!(matches!(outcome, RecoveryOutcome::NotEligible { after_count: 2, .. }));
        assert_eq!(store.writes(), 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_promotion_sends_nothing() {
        let before = slot(SlotType::SelfTraining, &[]);
        let after = slot(SlotType::SelfTraining, &["a", "b", "c"]);
        let store = MemorySlotStore::with_slots([after.clone()]);
        store.set_fail_mutations(true);
        let notifier = RecordingNotifier::default();

        let err = handle_change(&store, &notifier, &settings(), &before, &after).await.unwrap_err();
        assert!(matches!(err, TrainbellError::StoreMutate(_)));
        assert!(notifier.sent().is_empty());
    }
}
