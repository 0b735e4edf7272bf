//! In-process slot store.
//!
//! Behaves like the SQLite store (atomic batches, every update fed to the
//! change queue) and can be told to fail queries or writes.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use trainbell_core::{
    ChangeFeed, Result, SlotChange, SlotId, SlotQuery, SlotStore, SlotUpdate, TrainbellError,
    TrainingSlot,
};

#[derive(Default)]
struct MemoryState {
    slots: BTreeMap<SlotId, TrainingSlot>,
    changes: VecDeque<(SlotChange, u32)>,
    next_seq: i64,
}

impl MemoryState {
    fn replace(&mut self, after: TrainingSlot) {
        if let Some(before) = self.slots.insert(after.id.clone(), after.clone()) {
            self.next_seq += 1;
            let change = SlotChange {
                seq: self.next_seq,
                slot_id: after.id.clone(),
                before,
                after,
            };
            self.changes.push_back((change, 0));
        }
    }
}

#[derive(Default)]
pub struct MemorySlotStore {
    state: Mutex<MemoryState>,
    fail_queries: AtomicBool,
    fail_mutations: AtomicBool,
    writes: AtomicUsize,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `slots`. Seeding does not produce changes.
    pub fn with_slots(slots: impl IntoIterator<Item = TrainingSlot>) -> Self {
        let state = MemoryState {
            slots: slots.into_iter().map(|s| (s.id.clone(), s)).collect(),
            ..MemoryState::default()
        };
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Replace the participant list of an existing slot.
    pub async fn set_participants<I, S>(&self, id: &SlotId, participants: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock().await;
        let mut slot = state
            .slots
            .get(id)
            .cloned()
            .ok_or_else(|| TrainbellError::StoreMutate(format!("slot {id} not found")))?;
        slot.participant_ids = participants.into_iter().map(Into::into).collect();
        state.replace(slot);
        Ok(())
    }

    pub async fn get(&self, id: &SlotId) -> Option<TrainingSlot> {
        self.state.lock().await.slots.get(id).cloned()
    }

    pub async fn pending_changes(&self) -> usize {
        self.state.lock().await.changes.len()
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    /// Successful `mutate` / `batch_mutate` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(TrainbellError::StoreMutate("memory store: writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn query(&self, query: &SlotQuery) -> Result<Vec<TrainingSlot>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(TrainbellError::StoreQuery("memory store: queries disabled".into()));
        }
        let state = self.state.lock().await;
        let matching = state.slots.values().filter(|s| query.matches(s)).cloned();
        Ok(match query.limit {
            Some(n) => matching.take(n).collect(),
            None => matching.collect(),
        })
    }

    async fn batch_mutate(&self, updates: &[SlotUpdate]) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        if let Some(missing) = updates.iter().find(|u| !state.slots.contains_key(&u.id)) {
            return Err(TrainbellError::StoreMutate(format!(
                "batch aborted: slot {} not found",
                missing.id
            )));
        }
        for update in updates {
            if let Some(mut slot) = state.slots.get(&update.id).cloned() {
                slot.slot_type = update.slot_type;
                state.replace(slot);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mutate(&self, update: &SlotUpdate) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let mut slot = state
            .slots
            .get(&update.id)
            .cloned()
            .ok_or_else(|| TrainbellError::StoreMutate(format!("slot {} not found", update.id)))?;
        slot.slot_type = update.slot_type;
        state.replace(slot);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemorySlotStore {
    async fn poll(&self, max: usize) -> Result<Vec<SlotChange>> {
        let state = self.state.lock().await;
        Ok(state.changes.iter().take(max).map(|(c, _)| c.clone()).collect())
    }

    async fn ack(&self, seq: i64) -> Result<()> {
        self.state.lock().await.changes.retain(|(c, _)| c.seq != seq);
        Ok(())
    }

    async fn fail(&self, seq: i64) -> Result<u32> {
        let mut state = self.state.lock().await;
        let entry = state
            .changes
            .iter_mut()
            .find(|(c, _)| c.seq == seq)
            .ok_or_else(|| TrainbellError::StoreMutate(format!("change #{seq} not pending")))?;
        entry.1 += 1;
        Ok(entry.1)
    }
}
