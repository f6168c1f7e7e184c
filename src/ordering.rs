//! Event ordering policy
//!
//! At equal timestamps, kinds that bring cash into the portfolio are applied
//! before kinds that take it out, so a same-instant deposit always funds a
//! same-instant purchase. The same rule orders unsorted input batches and
//! the forthcoming-event queue.

use crate::asset::{Asset, AssetKind};
use crate::transaction::{Transaction, TransactionKind};
use crate::types::Timestamp;
use std::cmp::Ordering;

/// Rank of a transaction kind at equal timestamps (lower goes first)
pub const fn kind_rank(kind: TransactionKind) -> u8 {
    match kind {
        TransactionKind::Deposit => 0,
        TransactionKind::Sell => 1,
        TransactionKind::Short => 2,
        TransactionKind::WriteOption => 3,
        TransactionKind::ExerciseOption => 4,
        TransactionKind::Buy => 5,
        TransactionKind::Cover => 6,
        TransactionKind::BuybackWrittenOption => 7,
        TransactionKind::TransactionCost => 8,
        TransactionKind::Withdraw => 9,
        TransactionKind::Unsupported => u8::MAX,
    }
}

/// Priority key of one scheduler entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey {
    pub time: Timestamp,
    pub rank: u8,
    pub asset_kind: AssetKind,
    pub asset_id: i64,
    /// Insertion counter; keeps equal keys in FIFO order
    pub sequence: u64,
}

/// Comparator service shared by batch sorting and the scheduler
#[derive(Debug, Clone, Default)]
pub struct EventOrdering {
    next_sequence: u64,
}

impl EventOrdering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare two transactions by (time, kind rank, asset kind, asset id)
    pub fn compare(&self, a: &Transaction, b: &Transaction) -> Ordering {
        a.time
            .cmp(&b.time)
            .then_with(|| kind_rank(a.kind).cmp(&kind_rank(b.kind)))
            .then_with(|| a.asset.kind.cmp(&b.asset.kind))
            .then_with(|| a.asset.id.cmp(&b.asset.id))
    }

    /// Stable sort of a caller-supplied batch
    pub fn sort_batch(&self, batch: &mut [Transaction]) {
        batch.sort_by(|a, b| self.compare(a, b));
    }

    /// Build the queue key for an automatic event and stamp it with a fresh
    /// insertion sequence
    pub fn key(&mut self, time: Timestamp, rank: u8, asset: &Asset) -> OrderKey {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        OrderKey {
            time,
            rank,
            asset_kind: asset.kind,
            asset_id: asset.id,
            sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_rank_table_order() {
        let order = [
            TransactionKind::Deposit,
            TransactionKind::Sell,
            TransactionKind::Short,
            TransactionKind::WriteOption,
            TransactionKind::ExerciseOption,
            TransactionKind::Buy,
            TransactionKind::Cover,
            TransactionKind::BuybackWrittenOption,
            TransactionKind::TransactionCost,
            TransactionKind::Withdraw,
        ];
        for pair in order.windows(2) {
            assert!(kind_rank(pair[0]) < kind_rank(pair[1]));
        }
    }

    #[test]
    fn test_deposit_sorts_before_sell_at_same_time() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();
        let stock = Asset::stock(1, Currency::USD, "NYSE");
        let mut batch = vec![
            Transaction::new(t, stock, TransactionKind::Sell, 5.0, 10.0),
            Transaction::deposit(t, Currency::USD, 100.0),
        ];
        EventOrdering::new().sort_batch(&mut batch);
        assert_eq!(batch[0].kind, TransactionKind::Deposit);
        assert_eq!(batch[1].kind, TransactionKind::Sell);
    }

    #[test]
    fn test_time_dominates_rank() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();
        let later = t + chrono::Duration::seconds(1);
        let ordering = EventOrdering::new();
        let withdraw = Transaction::withdraw(t, Currency::USD, 1.0);
        let deposit = Transaction::deposit(later, Currency::USD, 1.0);
        assert_eq!(ordering.compare(&withdraw, &deposit), Ordering::Less);
    }

    #[test]
    fn test_keys_break_ties_by_insertion() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();
        let asset = Asset::stock(1, Currency::USD, "NYSE");
        let mut ordering = EventOrdering::new();
        let a = ordering.key(t, 0, &asset);
        let b = ordering.key(t, 0, &asset);
        assert!(a < b);
    }
}
