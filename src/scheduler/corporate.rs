//! Corporate-action sequence - pull-advancing split/dividend stream of one asset

use crate::asset::Asset;
use crate::sources::{CorporateAction, CorporateActionSource};
use crate::types::{AssetSlot, Timestamp};
use chrono::Duration;
use std::collections::VecDeque;
use std::sync::Arc;

/// Fetch window for the first query after a (re)start; doubles while empty
const BASE_WINDOW_DAYS: i64 = 366;

fn just_before(time: Timestamp) -> Timestamp {
    time.checked_sub_signed(Duration::nanoseconds(1)).unwrap_or(time)
}

/// Saved read position of a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceMark {
    floor: Timestamp,
    consumed: Option<(Timestamp, usize)>,
}

/// Corporate actions of one stock, fetched window by window on demand
pub struct CorporateActionSequence {
    id: u64,
    asset: Asset,
    slot: AssetSlot,
    source: Arc<dyn CorporateActionSource>,
    horizon: Timestamp,
    /// Exclusive lower bound set at creation or resumption
    floor: Timestamp,
    /// Exclusive lower bound of the next fetch
    fetched_until: Timestamp,
    window: Duration,
    exhausted: bool,
    pending: VecDeque<CorporateAction>,
    /// Time of the last consumed record and how many were consumed at it
    consumed: Option<(Timestamp, usize)>,
}

impl CorporateActionSequence {
    /// Sequence of the actions of `asset` dated at or after `start`
    pub fn new(
        id: u64,
        asset: Asset,
        slot: AssetSlot,
        source: Arc<dyn CorporateActionSource>,
        start: Timestamp,
        horizon: Timestamp,
    ) -> Self {
        let floor = just_before(start);
        let mut sequence = Self {
            id,
            asset,
            slot,
            source,
            horizon,
            floor,
            fetched_until: floor,
            window: Duration::days(BASE_WINDOW_DAYS),
            exhausted: false,
            pending: VecDeque::new(),
            consumed: None,
        };
        sequence.fill();
        sequence
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn slot(&self) -> AssetSlot {
        self.slot
    }

    pub fn current(&self) -> Option<&CorporateAction> {
        self.pending.front()
    }

    fn fill(&mut self) {
        while self.pending.is_empty() && !self.exhausted {
            if self.fetched_until >= self.horizon {
                self.exhausted = true;
                break;
            }
            let to = self
                .fetched_until
                .checked_add_signed(self.window)
                .map_or(self.horizon, |to| to.min(self.horizon));
            let actions = self.source.actions(&self.asset, Some(self.fetched_until), to);
            self.fetched_until = to;
            if actions.is_empty() {
                self.window = self.window + self.window;
            } else {
                self.window = Duration::days(BASE_WINDOW_DAYS);
                self.pending.extend(actions);
            }
        }
    }

    /// Consume the current record
    pub fn advance(&mut self) {
        if let Some(action) = self.pending.pop_front() {
            self.consumed = match self.consumed {
                Some((time, count)) if time == action.time => Some((time, count + 1)),
                _ => Some((action.time, 1)),
            };
        }
        self.fill();
    }

    pub fn mark(&self) -> SequenceMark {
        SequenceMark {
            floor: self.floor,
            consumed: self.consumed,
        }
    }

    /// Rewind to `mark` by re-querying the source from the marked time
    pub fn restore(&mut self, mark: SequenceMark) {
        self.floor = mark.floor;
        self.consumed = mark.consumed;
        self.pending.clear();
        self.exhausted = false;
        self.window = Duration::days(BASE_WINDOW_DAYS);

        let Some((time, skip)) = mark.consumed else {
            self.fetched_until = mark.floor;
            self.fill();
            return;
        };
        self.fetched_until = just_before(time).max(mark.floor);
        self.fill();
        let mut skipped = 0;
        while skipped < skip && self.pending.front().map_or(false, |action| action.time == time) {
            self.pending.pop_front();
            skipped += 1;
            if self.pending.is_empty() {
                self.fill();
            }
        }
    }

    /// Drop every record strictly before `time`, keeping records already
    /// consumed at or after it consumed.
    pub fn skip_before(&mut self, time: Timestamp) {
        match self.consumed {
            Some((consumed_at, _)) if consumed_at >= time => {}
            _ => {
                self.consumed = None;
                self.floor = self.floor.max(just_before(time));
            }
        }
        self.restore(self.mark());
    }
}

impl std::fmt::Debug for CorporateActionSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorporateActionSequence")
            .field("id", &self.id)
            .field("asset", &self.asset)
            .field("slot", &self.slot)
            .field("pending", &self.pending.len())
            .field("consumed", &self.consumed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::sources::InMemoryCorporateActions;
    use chrono::{DateTime, TimeZone, Utc};
    use std::cell::Cell;

    fn day(d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    fn stock() -> Asset {
        Asset::stock(9, Currency::USD, "NYSE")
    }

    fn source() -> Arc<InMemoryCorporateActions> {
        let mut actions = InMemoryCorporateActions::new();
        actions.add(stock(), CorporateAction::dividend(day(2), 0.1));
        actions.add(stock(), CorporateAction::dividend(day(5), 0.2));
        actions.add(stock(), CorporateAction::split(day(5), 1.0, 2.0, 50.0));
        actions.add(stock(), CorporateAction::dividend(day(20), 0.3));
        Arc::new(actions)
    }

    fn sequence(start: Timestamp) -> CorporateActionSequence {
        CorporateActionSequence::new(1, stock(), 3, source(), start, DateTime::<Utc>::MAX_UTC)
    }

    fn times(sequence: &mut CorporateActionSequence) -> Vec<Timestamp> {
        let mut out = Vec::new();
        while let Some(action) = sequence.current() {
            out.push(action.time);
            sequence.advance();
        }
        out
    }

    #[test]
    fn test_starts_at_creation_time_inclusive() {
        let mut seq = sequence(day(5));
        assert_eq!(times(&mut seq), vec![day(5), day(5), day(20)]);
    }

    #[test]
    fn test_horizon_bounds_sequence() {
        let mut seq = CorporateActionSequence::new(1, stock(), 3, source(), day(1), day(5));
        assert_eq!(times(&mut seq), vec![day(2), day(5), day(5)]);
    }

    #[test]
    fn test_restore_replays_from_mark_within_same_time() {
        let mut seq = sequence(day(1));
        seq.advance();
        seq.advance();
        // Between the two records dated day 5
        let mark = seq.mark();
        assert!(seq.current().unwrap().is_split);

        seq.advance();
        seq.advance();
        assert!(seq.current().is_none());

        seq.restore(mark);
        assert!(seq.current().unwrap().is_split);
        assert_eq!(times(&mut seq), vec![day(5), day(20)]);
    }

    #[test]
    fn test_skip_before_resumption() {
        let mut seq = sequence(day(1));
        seq.skip_before(day(6));
        assert_eq!(times(&mut seq), vec![day(20)]);

        let mut seq = sequence(day(1));
        seq.skip_before(day(5));
        assert_eq!(seq.current().map(|a| a.time), Some(day(5)));
    }

    #[test]
    fn test_skip_before_keeps_consumed_records_consumed() {
        let mut seq = sequence(day(1));
        seq.advance();
        seq.advance();
        seq.skip_before(day(5));
        assert!(seq.current().unwrap().is_split);
    }

    struct Counting {
        inner: InMemoryCorporateActions,
        calls: Cell<usize>,
    }

    impl CorporateActionSource for Counting {
        fn actions(
            &self,
            asset: &Asset,
            from_exclusive: Option<Timestamp>,
            to_inclusive: Timestamp,
        ) -> Vec<CorporateAction> {
            self.calls.set(self.calls.get() + 1);
            self.inner.actions(asset, from_exclusive, to_inclusive)
        }
    }

    #[test]
    fn test_fetches_lazily_by_window() {
        let mut inner = InMemoryCorporateActions::new();
        inner.add(stock(), CorporateAction::dividend(day(2), 0.1));
        let counting = Arc::new(Counting {
            inner,
            calls: Cell::new(0),
        });
        let seq = CorporateActionSequence::new(
            1,
            stock(),
            0,
            counting.clone(),
            day(1),
            DateTime::<Utc>::MAX_UTC,
        );
        assert_eq!(seq.current().map(|a| a.time), Some(day(2)));
        assert_eq!(counting.calls.get(), 1);
    }
}
