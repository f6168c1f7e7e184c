//! Event timeline - append-only log of applied events and balance deltas
//!
//! # Components
//!
//! - **bitmap**: bit-index arithmetic for the membership bitmap
//! - **index**: versioned balance index buffers and event handles
//! - **event**: events and balance items
//!
//! With history retained, every event and its items are appended forever
//! and a live index tracks the latest state. With history disabled the
//! timeline keeps one rolling event and one rolling item per asset, which
//! is all a single point-in-time query needs.

pub mod bitmap;
pub mod event;
pub mod index;

pub use event::{BalanceItem, Event, EventKind};
pub use index::{EventHandle, IndexBuffer, IndexData};

use crate::asset::Asset;
use crate::error::{PortfolioError, Result};
use crate::transaction::Transaction;
use crate::types::{AssetSlot, Timestamp};
use hashbrown::HashMap;
use std::rc::Rc;

/// Events between two stored index checkpoints
pub const CHECKPOINT_INTERVAL: usize = 256;

/// Append-only event log plus the live balance index
#[derive(Debug)]
pub struct Timeline {
    retain_history: bool,
    assets: Vec<Asset>,
    slots: HashMap<Asset, AssetSlot>,
    events: Vec<Event>,
    items: Vec<BalanceItem>,
    live: Rc<IndexBuffer>,
    /// Index state after every `CHECKPOINT_INTERVAL` events (history only)
    checkpoints: Vec<IndexData>,
    applied: usize,
}

impl Timeline {
    pub fn new(retain_history: bool) -> Self {
        Self {
            retain_history,
            assets: Vec::new(),
            slots: HashMap::new(),
            events: Vec::new(),
            items: vec![BalanceItem::void()],
            live: IndexBuffer::new(),
            checkpoints: Vec::new(),
            applied: 0,
        }
    }

    pub fn retains_history(&self) -> bool {
        self.retain_history
    }

    /// Slot of `asset`, registering it on first sight
    pub fn register_asset(&mut self, asset: &Asset) -> (AssetSlot, bool) {
        if let Some(&slot) = self.slots.get(asset) {
            return (slot, false);
        }
        let slot = self.assets.len();
        self.assets.push(asset.clone());
        self.slots.insert(asset.clone(), slot);
        (slot, true)
    }

    pub fn slot_of(&self, asset: &Asset) -> Option<AssetSlot> {
        self.slots.get(asset).copied()
    }

    pub fn asset(&self, slot: AssetSlot) -> Option<&Asset> {
        self.assets.get(slot)
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Events stored (1 at most without history)
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events applied since construction, retained or not
    pub fn applied_count(&self) -> usize {
        self.applied
    }

    pub fn event(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn item(&self, index: usize) -> Option<&BalanceItem> {
        self.items.get(index)
    }

    /// Balance items attached to `event`
    pub fn items_of(&self, event: &Event) -> &[BalanceItem] {
        if self.retain_history {
            &self.items[event.item_range()]
        } else {
            &[]
        }
    }

    pub fn last_event(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Append one event and its balance deltas.
    ///
    /// Returns the event index (always 0 without history).
    pub fn append_event(
        &mut self,
        kind: EventKind,
        time: Timestamp,
        asset_slot: AssetSlot,
        transaction: Option<Transaction>,
        deltas: Vec<BalanceItem>,
        usd_only: bool,
    ) -> usize {
        self.applied += 1;
        let item_count = deltas.len();

        if !self.retain_history {
            let mut writes = Vec::with_capacity(item_count);
            for mut item in deltas {
                let index = item.asset_slot + 1;
                if self.items.len() <= index {
                    self.items.resize(index + 1, BalanceItem::void());
                }
                item.event = 0;
                writes.push((item.asset_slot, index, item.is_nonzero));
                self.items[index] = item;
            }
            let event = Event {
                time,
                kind,
                asset_slot,
                transaction,
                first_item: 0,
                item_count,
                usd_only,
            };
            match self.events.first_mut() {
                Some(rolling) => *rolling = event,
                None => self.events.push(event),
            }
            self.live.apply(writes);
            return 0;
        }

        let index = self.events.len();
        let first_item = self.items.len();
        let mut writes = Vec::with_capacity(item_count);
        for (offset, mut item) in deltas.into_iter().enumerate() {
            item.event = index;
            writes.push((item.asset_slot, first_item + offset, item.is_nonzero));
            self.items.push(item);
        }
        self.events.push(Event {
            time,
            kind,
            asset_slot,
            transaction,
            first_item,
            item_count,
            usd_only,
        });
        self.live.apply(writes);
        if self.events.len() % CHECKPOINT_INTERVAL == 0 {
            self.checkpoints.push(self.live.data().clone());
        }
        index
    }

    /// Handle on the latest state, aliasing the live index.
    ///
    /// The next append invalidates it unless it is detached first.
    pub fn current_handle(&self) -> EventHandle {
        let event = if self.events.is_empty() {
            None
        } else {
            Some(self.events.len() - 1)
        };
        EventHandle::aliasing(&self.live, event, false)
    }

    /// Index of the last event at or before `time`
    pub fn last_event_at(&self, time: Timestamp) -> Option<usize> {
        let end = self.events.partition_point(|event| event.time <= time);
        end.checked_sub(1)
    }

    fn require_history(&self, operation: &str) -> Result<()> {
        if self.retain_history {
            Ok(())
        } else {
            Err(PortfolioError::HistoryDisabled(operation.to_string()))
        }
    }

    /// Nearest checkpoint at or before `count` events and the number of
    /// events it covers
    fn checkpoint_before(&self, count: usize) -> (Option<&IndexData>, usize) {
        let stored = (count / CHECKPOINT_INTERVAL).min(self.checkpoints.len());
        match stored.checked_sub(1) {
            Some(i) => (self.checkpoints.get(i), stored * CHECKPOINT_INTERVAL),
            None => (None, 0),
        }
    }

    /// Index state after the first `count` events, replayed from the
    /// nearest checkpoint
    fn replay(&self, count: usize) -> IndexData {
        if count == self.events.len() {
            return self.live.data().clone();
        }
        let (checkpoint, start) = self.checkpoint_before(count);
        let mut data = checkpoint.cloned().unwrap_or_default();
        for event in &self.events[start..count] {
            for offset in event.item_range() {
                let item = &self.items[offset];
                data.set(item.asset_slot, offset, item.is_nonzero);
            }
        }
        data
    }

    /// Detached handle on the state as of `time`
    pub fn handle_at(&self, time: Timestamp) -> Result<EventHandle> {
        self.require_history("handle_at")?;
        let event = self.last_event_at(time);
        let count = event.map(|e| e + 1).unwrap_or(0);
        Ok(EventHandle::owning(self.replay(count), event))
    }

    /// Lazy forward traversal of the events at or after `time`
    pub fn events_from(&self, time: Timestamp, include_leading_void: bool) -> Result<EventCursor<'_>> {
        self.require_history("events_from")?;
        let start = self.events.partition_point(|event| event.time < time);
        let buffer = IndexBuffer::new();
        if start > 0 {
            buffer.apply(self.events[..start].iter().flat_map(|event| {
                event.item_range().map(|offset| {
                    let item = &self.items[offset];
                    (item.asset_slot, offset, item.is_nonzero)
                })
            }));
        }
        Ok(EventCursor {
            timeline: self,
            buffer,
            next: start,
            pending_void: include_leading_void,
        })
    }
}

/// Forward-only traversal over the timeline.
///
/// All handles it yields alias one working buffer that advances in place,
/// so a handle must be detached before the cursor moves past it if it is
/// to be read later.
#[derive(Debug)]
pub struct EventCursor<'a> {
    timeline: &'a Timeline,
    buffer: Rc<IndexBuffer>,
    next: usize,
    pending_void: bool,
}

impl<'a> EventCursor<'a> {
    /// Next event to be yielded, without applying it
    pub fn lookahead(&self) -> Option<&'a Event> {
        self.timeline.events.get(self.next)
    }

    pub fn timeline(&self) -> &'a Timeline {
        self.timeline
    }
}

impl Iterator for EventCursor<'_> {
    type Item = EventHandle;

    fn next(&mut self) -> Option<EventHandle> {
        if self.pending_void {
            self.pending_void = false;
            let previous = self.next.checked_sub(1);
            return Some(EventHandle::aliasing(&self.buffer, previous, true));
        }

        let timeline = self.timeline;
        let event = timeline.events.get(self.next)?;
        let items = &timeline.items;
        self.buffer.apply(event.item_range().map(|offset| {
            let item = &items[offset];
            (item.asset_slot, offset, item.is_nonzero)
        }));
        let handle = EventHandle::aliasing(&self.buffer, Some(self.next), false);
        self.next += 1;
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use chrono::{Duration, TimeZone, Utc};

    fn item(slot: AssetSlot, volume: f64) -> BalanceItem {
        BalanceItem {
            asset_slot: slot,
            volume,
            average_price: 1.0,
            deposit: 0.0,
            is_cash: true,
            is_nonzero: volume != 0.0,
            event: 0,
        }
    }

    fn timeline_with_three_events(retain: bool) -> (Timeline, Timestamp) {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        let mut timeline = Timeline::new(retain);
        let (usd, _) = timeline.register_asset(&Asset::cash(Currency::USD));
        let (eur, _) = timeline.register_asset(&Asset::cash(Currency::EUR));
        timeline.append_event(EventKind::Transaction, t0, usd, None, vec![item(usd, 100.0)], true);
        timeline.append_event(
            EventKind::Transaction,
            t0 + Duration::days(1),
            eur,
            None,
            vec![item(eur, 50.0)],
            false,
        );
        timeline.append_event(
            EventKind::Transaction,
            t0 + Duration::days(2),
            usd,
            None,
            vec![item(usd, 0.0)],
            false,
        );
        (timeline, t0)
    }

    #[test]
    fn test_slot_zero_item_is_void() {
        let (timeline, _) = timeline_with_three_events(true);
        assert_eq!(timeline.item(0), Some(&BalanceItem::void()));
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline.items_of(&timeline.events()[1])[0].event, 1);
    }

    #[test]
    fn test_live_index_tracks_latest() {
        let (timeline, _) = timeline_with_three_events(true);
        let handle = timeline.current_handle();
        assert_eq!(handle.event(), Some(2));
        let live = handle.with_index(|index| index.live_slots().collect::<Vec<_>>()).unwrap();
        assert_eq!(live, vec![1]);
    }

    #[test]
    fn test_current_handle_goes_stale_on_append() {
        let (mut timeline, t0) = timeline_with_three_events(true);
        let handle = timeline.current_handle();
        let kept = handle.detach().unwrap();
        timeline.append_event(
            EventKind::Transaction,
            t0 + Duration::days(3),
            0,
            None,
            vec![item(0, 5.0)],
            false,
        );
        assert!(matches!(handle.live_item(0), Err(PortfolioError::StaleHandle { .. })));
        assert_eq!(kept.live_item(0).unwrap(), None);
    }

    #[test]
    fn test_events_from_with_void_and_lookahead() {
        let (timeline, t0) = timeline_with_three_events(true);
        let mut cursor = timeline.events_from(t0 + Duration::hours(1), true).unwrap();
        assert_eq!(cursor.lookahead().map(|e| e.time), Some(t0 + Duration::days(1)));

        let void = cursor.next().unwrap();
        assert!(void.is_void());
        assert_eq!(void.event(), Some(0));
        assert_eq!(void.live_item(0).unwrap(), Some(1));
        let void = void.detach().unwrap();

        let first = cursor.next().unwrap();
        assert_eq!(first.event(), Some(1));
        assert!(first.live_item(1).unwrap().is_some());

        let second = cursor.next().unwrap();
        assert!(first.live_item(0).is_err());
        assert_eq!(second.live_item(0).unwrap(), None);
        assert!(cursor.next().is_none());

        // The detached void still sees the pre-traversal state
        assert_eq!(void.live_item(0).unwrap(), Some(1));
        assert_eq!(void.live_item(1).unwrap(), None);
    }

    #[test]
    fn test_handle_at_replays_to_time() {
        let (timeline, t0) = timeline_with_three_events(true);
        let before = timeline.handle_at(t0 - Duration::days(1)).unwrap();
        assert_eq!(before.event(), None);
        assert_eq!(before.with_index(|i| i.live_count()).unwrap(), 0);

        let mid = timeline.handle_at(t0 + Duration::days(1)).unwrap();
        assert_eq!(mid.event(), Some(1));
        assert_eq!(mid.with_index(|i| i.live_count()).unwrap(), 2);
    }

    #[test]
    fn test_point_mode_keeps_one_rolling_event() {
        let (timeline, t0) = timeline_with_three_events(false);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.applied_count(), 3);
        assert_eq!(timeline.last_event().map(|e| e.time), Some(t0 + Duration::days(2)));

        let handle = timeline.current_handle();
        assert_eq!(handle.live_item(0).unwrap(), None);
        let eur = handle.live_item(1).unwrap().unwrap();
        assert_eq!(timeline.item(eur).map(|i| i.volume), Some(50.0));

        assert!(matches!(
            timeline.events_from(t0, false),
            Err(PortfolioError::HistoryDisabled(_))
        ));
        assert!(timeline.handle_at(t0).is_err());
    }

    #[test]
    fn test_handle_at_resumes_from_checkpoint() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        let mut timeline = Timeline::new(true);
        let slots: Vec<AssetSlot> = [Currency::USD, Currency::EUR, Currency::GBP]
            .into_iter()
            .map(|currency| timeline.register_asset(&Asset::cash(currency)).0)
            .collect();
        let total = 2 * CHECKPOINT_INTERVAL + 50;
        for i in 0..total {
            let slot = slots[i % slots.len()];
            let volume = if i % 7 == 0 { 0.0 } else { i as f64 };
            timeline.append_event(
                EventKind::Transaction,
                t0 + Duration::minutes(i as i64),
                slot,
                None,
                vec![item(slot, volume)],
                false,
            );
        }

        for count in [1, CHECKPOINT_INTERVAL, CHECKPOINT_INTERVAL + 3, total - 1] {
            let (_, start) = timeline.checkpoint_before(count);
            assert!(start <= count && count - start < CHECKPOINT_INTERVAL);

            let mut reference = IndexData::new();
            for event in &timeline.events()[..count] {
                for offset in event.item_range() {
                    let item = &timeline.items[offset];
                    reference.set(item.asset_slot, offset, item.is_nonzero);
                }
            }
            let handle = timeline.handle_at(t0 + Duration::minutes(count as i64 - 1)).unwrap();
            assert_eq!(handle.event(), Some(count - 1));
            handle
                .with_index(|index| {
                    assert_eq!(
                        index.live_slots().collect::<Vec<_>>(),
                        reference.live_slots().collect::<Vec<_>>()
                    );
                    for &slot in &slots {
                        assert_eq!(index.item_of(slot), reference.item_of(slot));
                    }
                })
                .unwrap();
        }
    }
}
