//! Forthcoming-event scheduler
//!
//! A min-queue of pull-advancing sequences, each holding the next automatic
//! event of one asset. The builder pops whatever is due before a
//! transaction, applies it, and hands the sequence back to be requeued at
//! its next time, parked while its asset is dormant, or dropped once it
//! runs out.
//!
//! # Components
//!
//! - **corporate**: split/dividend stream of one stock
//! - **exercise**: single deferred option-exercise delivery

pub mod corporate;
pub mod exercise;

pub use corporate::{CorporateActionSequence, SequenceMark};
pub use exercise::DeferredExercise;

use crate::asset::Asset;
use crate::ordering::{kind_rank, EventOrdering, OrderKey};
use crate::sources::CorporateAction;
use crate::timeline::EventKind;
use crate::transaction::TransactionKind;
use crate::types::{AssetSlot, Timestamp};
use hashbrown::HashMap;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Pending automatic events of one asset
#[derive(Debug)]
pub enum ForthcomingEvents {
    Corporate(CorporateActionSequence),
    Exercise(DeferredExercise),
}

/// Saved position of a [`ForthcomingEvents`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForthcomingMark {
    Corporate(SequenceMark),
    Exercise { delivered: bool },
}

impl ForthcomingEvents {
    pub fn id(&self) -> u64 {
        match self {
            ForthcomingEvents::Corporate(sequence) => sequence.id(),
            ForthcomingEvents::Exercise(exercise) => exercise.id(),
        }
    }

    pub fn asset(&self) -> &Asset {
        match self {
            ForthcomingEvents::Corporate(sequence) => sequence.asset(),
            ForthcomingEvents::Exercise(exercise) => &exercise.underlying,
        }
    }

    /// Slot whose dormancy parks the sequence (None = never parked)
    pub fn dormancy_slot(&self) -> Option<AssetSlot> {
        match self {
            ForthcomingEvents::Corporate(sequence) => Some(sequence.slot()),
            ForthcomingEvents::Exercise(_) => None,
        }
    }

    pub fn current_time(&self) -> Option<Timestamp> {
        match self {
            ForthcomingEvents::Corporate(sequence) => sequence.current().map(|action| action.time),
            ForthcomingEvents::Exercise(exercise) => {
                (!exercise.is_delivered()).then_some(exercise.time)
            }
        }
    }

    /// Corporate actions add cash and rank with deposits
    pub fn rank(&self) -> u8 {
        match self {
            ForthcomingEvents::Corporate(_) => kind_rank(TransactionKind::Deposit),
            ForthcomingEvents::Exercise(exercise) => kind_rank(exercise.kind()),
        }
    }

    pub fn event_kind(&self) -> Option<EventKind> {
        match self {
            ForthcomingEvents::Corporate(sequence) => sequence.current().map(|action| {
                if action.is_split {
                    EventKind::Split
                } else {
                    EventKind::Dividend
                }
            }),
            ForthcomingEvents::Exercise(exercise) => {
                (!exercise.is_delivered()).then_some(EventKind::Transaction)
            }
        }
    }

    pub fn current_action(&self) -> Option<&CorporateAction> {
        match self {
            ForthcomingEvents::Corporate(sequence) => sequence.current(),
            ForthcomingEvents::Exercise(_) => None,
        }
    }

    pub fn advance(&mut self) {
        match self {
            ForthcomingEvents::Corporate(sequence) => sequence.advance(),
            ForthcomingEvents::Exercise(exercise) => exercise.advance(),
        }
    }

    pub fn mark(&self) -> ForthcomingMark {
        match self {
            ForthcomingEvents::Corporate(sequence) => ForthcomingMark::Corporate(sequence.mark()),
            ForthcomingEvents::Exercise(exercise) => ForthcomingMark::Exercise {
                delivered: exercise.is_delivered(),
            },
        }
    }

    pub fn restore(&mut self, mark: ForthcomingMark) {
        match (self, mark) {
            (ForthcomingEvents::Corporate(sequence), ForthcomingMark::Corporate(mark)) => {
                sequence.restore(mark)
            }
            (ForthcomingEvents::Exercise(exercise), ForthcomingMark::Exercise { delivered }) => {
                exercise.restore(delivered)
            }
            (events, mark) => {
                log::warn!("Ignoring mismatched mark {:?} for sequence {}", mark, events.id())
            }
        }
    }

    /// Drop every record strictly before `time`
    pub fn skip_before(&mut self, time: Timestamp) {
        if let ForthcomingEvents::Corporate(sequence) = self {
            sequence.skip_before(time);
        }
    }
}

/// Queued sequence; the heap is a min-queue on `key`
#[derive(Debug)]
pub struct QueueEntry {
    pub key: OrderKey,
    pub events: ForthcomingEvents,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Next automatic event, reported without committing it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForthcomingPreview {
    pub time: Timestamp,
    pub kind: EventKind,
    pub asset: Asset,
}

/// Priority queue of forthcoming events plus the parked sequences
#[derive(Debug)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<QueueEntry>>,
    suspended: HashMap<AssetSlot, Vec<ForthcomingEvents>>,
    ordering: EventOrdering,
    horizon: Timestamp,
    next_id: u64,
}

impl Scheduler {
    pub fn new(ordering: EventOrdering, horizon: Timestamp) -> Self {
        Self {
            queue: BinaryHeap::new(),
            suspended: HashMap::new(),
            ordering,
            horizon,
            next_id: 0,
        }
    }

    pub fn ordering(&self) -> &EventOrdering {
        &self.ordering
    }

    pub fn horizon(&self) -> Timestamp {
        self.horizon
    }

    /// Fresh sequence id
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn suspended_len(&self) -> usize {
        self.suspended.values().map(Vec::len).sum()
    }

    /// Slots with at least one parked sequence
    pub fn suspended_slots(&self) -> impl Iterator<Item = AssetSlot> + '_ {
        self.suspended
            .iter()
            .filter(|(_, parked)| !parked.is_empty())
            .map(|(slot, _)| *slot)
    }

    /// Queue `events` at its current time; ended sequences and those past
    /// the horizon are dropped.
    pub fn push(&mut self, events: ForthcomingEvents) {
        match events.current_time() {
            Some(time) if time <= self.horizon => {
                let key = self.ordering.key(time, events.rank(), events.asset());
                self.queue.push(Reverse(QueueEntry { key, events }));
            }
            Some(time) => {
                log::debug!("Dropping sequence {} at {} beyond the horizon", events.id(), time)
            }
            None => log::debug!("Sequence {} ended", events.id()),
        }
    }

    /// Time of the earliest queued event
    pub fn next_time(&self) -> Option<Timestamp> {
        self.queue.peek().map(|Reverse(entry)| entry.key.time)
    }

    /// Pop the earliest entry when it is due at or before `time`
    pub fn pop_due(&mut self, time: Timestamp) -> Option<QueueEntry> {
        if self.next_time()? <= time {
            self.queue.pop().map(|Reverse(entry)| entry)
        } else {
            None
        }
    }

    /// Park `events` until its asset becomes active again
    pub fn suspend(&mut self, slot: AssetSlot, events: ForthcomingEvents) {
        log::debug!("Suspending sequence {} of slot {}", events.id(), slot);
        self.suspended.entry(slot).or_default().push(events);
    }

    /// Requeue the sequences parked for `slot`, skipping records strictly
    /// before `time`.
    pub fn resume(&mut self, slot: AssetSlot, time: Timestamp) -> usize {
        let Some(parked) = self.suspended.remove(&slot) else {
            return 0;
        };
        let count = parked.len();
        for mut events in parked {
            log::debug!("Resuming sequence {} of slot {} at {}", events.id(), slot, time);
            events.skip_before(time);
            self.push(events);
        }
        count
    }

    /// Report the next event that would change the portfolio, leaving every
    /// sequence where it was.
    ///
    /// `is_dormant` tells which parked-on-pop sequences to pass over and
    /// `is_effective` whether a sequence's current record changes anything.
    pub fn peek<D, E>(&mut self, is_dormant: D, is_effective: E) -> Option<ForthcomingPreview>
    where
        D: Fn(AssetSlot) -> bool,
        E: Fn(&ForthcomingEvents) -> bool,
    {
        let mut touched: HashMap<u64, (ForthcomingMark, OrderKey)> = HashMap::new();
        let mut parked: Vec<QueueEntry> = Vec::new();
        let mut preview = None;

        while let Some(Reverse(QueueEntry { key, mut events })) = self.queue.pop() {
            if events.dormancy_slot().map_or(false, &is_dormant) {
                parked.push(QueueEntry { key, events });
                continue;
            }
            if is_effective(&events) {
                preview = events.event_kind().map(|kind| ForthcomingPreview {
                    time: key.time,
                    kind,
                    asset: events.asset().clone(),
                });
                parked.push(QueueEntry { key, events });
                break;
            }

            touched.entry(events.id()).or_insert((events.mark(), key));
            events.advance();
            match events.current_time() {
                Some(time) if time <= self.horizon => {
                    let key = self.ordering.key(time, events.rank(), events.asset());
                    self.queue.push(Reverse(QueueEntry { key, events }));
                }
                _ => parked.push(QueueEntry { key, events }),
            }
        }

        let entries: Vec<QueueEntry> = self
            .queue
            .drain()
            .map(|Reverse(entry)| entry)
            .chain(parked)
            .collect();
        for QueueEntry { mut key, mut events } in entries {
            if let Some((mark, original)) = touched.remove(&events.id()) {
                events.restore(mark);
                key = original;
            }
            self.queue.push(Reverse(QueueEntry { key, events }));
        }
        preview
    }
}
