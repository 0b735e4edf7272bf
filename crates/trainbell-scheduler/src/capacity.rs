//! Daily capacity check: tomorrow's under-filled training slots become
//! self-training, all in one batch, announced once.

use chrono::{DateTime, NaiveDate, Utc};
use trainbell_core::{
    Notifier, Result, SlotId, SlotQuery, SlotStore, SlotType, SlotUpdate, TrainingSlot,
};

use crate::jobs::JobSettings;
use crate::notify::NotificationKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityOutcome {
    pub target: NaiveDate,
    /// Training slots examined.
    pub scanned: usize,
    /// Slots demoted in this run's batch.
    pub demoted: Vec<SlotId>,
    pub notified: bool,
}

/// Stage a demotion for every slot with `min_participants` or fewer
/// distinct participants.
pub fn plan_demotions(slots: &[TrainingSlot], min_participants: usize) -> Vec<SlotUpdate> {
    let mut staged = Vec::new();
    for slot in slots {
        let count = slot.participant_count();
        tracing::debug!("Slot {} ({}): {} participants", slot.id, slot.key_or_unknown(), count);
        if count <= min_participants {
            tracing::info!(
                "⬇️ Slot {} has only {} participants, switching to self-training",
                slot.id,
                count
            );
            staged.push(SlotUpdate::set_type(slot.id.clone(), SlotType::SelfTraining));
        }
    }
    staged
}

/// Demote tomorrow's under-filled training slots.
///
/// All demotions go out in one atomic batch; the shortfall notification is
/// sent once, only after the batch committed.
pub async fn adjust_capacity(
    store: &dyn SlotStore,
    notifier: &dyn Notifier,
    settings: &JobSettings,
    now: DateTime<Utc>,
) -> Result<CapacityOutcome> {
    let target = settings.calendar.days_ahead(now, settings.rules.capacity_days);
    tracing::info!("🔎 Checking participant counts of training slots on {target}");

    let slots = store.query(&SlotQuery::on(target, SlotType::Training)).await?;
    let mut outcome = CapacityOutcome {
        target,
        scanned: slots.len(),
        demoted: Vec::new(),
        notified: false,
    };
    if slots.is_empty() {
        tracing::info!("No training slot on {target}");
        return Ok(outcome);
    }

    let staged = plan_demotions(&slots, settings.rules.min_participants);
    if staged.is_empty() {
        tracing::info!("All {} slots on {target} have enough participants", slots.len());
        return Ok(outcome);
    }

    store.batch_mutate(&staged).await?;
    tracing::info!("💾 {} slots on {target} switched to self-training", staged.len());
    outcome.demoted = staged.into_iter().map(|u| u.id).collect();

    notifier.send(&settings.event(NotificationKind::Shortfall)).await?;
    outcome.notified = true;
    Ok(outcome)
}
