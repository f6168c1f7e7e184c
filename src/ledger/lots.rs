//! Lot queue - cost-basis tracking for one asset
//!
//! Lots are kept oldest first. The queue only ever holds lots of one sign;
//! an opposite-signed change consumes lots and, once it crosses zero, the
//! queue restarts with the remainder.

use crate::types::{is_zero, Price, Quantity, EPSILON};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Lot - one (volume, price) entry of a cost-basis queue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    /// Signed volume of this lot
    pub volume: Quantity,
    /// Cost per unit
    pub price: Price,
}

impl Lot {
    pub fn new(volume: Quantity, price: Price) -> Self {
        Self { volume, price }
    }

    /// Total cost of this lot
    pub fn total_price(&self) -> f64 {
        self.volume * self.price
    }
}

/// Queue of open lots
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LotQueue {
    lots: VecDeque<Lot>,
}

impl LotQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn clear(&mut self) {
        self.lots.clear();
    }

    fn sign(&self) -> f64 {
        self.lots.front().map(|lot| lot.volume.signum()).unwrap_or(0.0)
    }

    /// Add a signed volume at `price`, consuming the oldest lots first when
    /// the sign is opposite to the queue's.
    pub fn add_or_remove_fifo(&mut self, volume: Quantity, price: Price) {
        if is_zero(volume) {
            return;
        }

        let sign = self.sign();
        if sign == 0.0 || sign == volume.signum() {
            match self.lots.back_mut() {
                // Merge on exact price match to bound queue growth
                Some(last) if last.price == price => last.volume += volume,
                _ => self.lots.push_back(Lot::new(volume, price)),
            }
            return;
        }

        let mut remaining = volume;
        while let Some(front) = self.lots.front_mut() {
            if front.volume.abs() <= remaining.abs() + EPSILON {
                remaining += front.volume;
                self.lots.pop_front();
                if is_zero(remaining) {
                    remaining = 0.0;
                    break;
                }
            } else {
                front.volume += remaining;
                remaining = 0.0;
                break;
            }
        }

        if remaining != 0.0 {
            // Crossed zero: restart with the remainder
            self.lots.clear();
            self.lots.push_back(Lot::new(remaining, price));
        }
    }

    /// Remove `volume` units (magnitude) from the newest lots first.
    ///
    /// Returns the signed volume and the total price of what was removed.
    pub fn remove_lifo(&mut self, volume: Quantity) -> (Quantity, f64) {
        let mut remaining = volume.abs();
        let mut removed_volume = 0.0;
        let mut removed_price = 0.0;

        while remaining > EPSILON {
            let Some(back) = self.lots.back_mut() else {
                break;
            };
            let available = back.volume.abs();
            let sign = back.volume.signum();
            if available <= remaining + EPSILON {
                removed_volume += back.volume;
                removed_price += back.total_price();
                remaining -= available;
                self.lots.pop_back();
            } else {
                let taken = sign * remaining;
                back.volume -= taken;
                removed_volume += taken;
                removed_price += taken * back.price;
                remaining = 0.0;
            }
        }

        (removed_volume, removed_price)
    }

    /// Total volume and volume-weighted total price
    pub fn sum(&self) -> (Quantity, f64) {
        self.lots.iter().fold((0.0, 0.0), |(volume, price), lot| {
            (volume + lot.volume, price + lot.total_price())
        })
    }

    /// Rescale every lot for a split of `ratio` new units per old unit.
    /// Total cost is preserved.
    pub fn scale(&mut self, ratio: f64) {
        for lot in self.lots.iter_mut() {
            lot.volume *= ratio;
            lot.price /= ratio;
        }
    }

    /// Cash-style update: keeps a single running balance at unit price
    pub fn adjust_balance(&mut self, delta: f64) {
        match self.lots.front_mut() {
            Some(lot) => lot.volume += delta,
            None => self.lots.push_back(Lot::new(delta, 1.0)),
        }
        if self.lots.front().map(|lot| is_zero(lot.volume)).unwrap_or(false) {
            self.lots.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn average(queue: &LotQueue) -> f64 {
        let (volume, price) = queue.sum();
        price / volume
    }

    #[test]
    fn test_merge_on_equal_price() {
        let mut queue = LotQueue::new();
        queue.add_or_remove_fifo(10.0, 5.0);
        queue.add_or_remove_fifo(5.0, 5.0);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.sum(), (15.0, 75.0));
    }

    #[test]
    fn test_fifo_partial_sell() {
        let mut queue = LotQueue::new();
        queue.add_or_remove_fifo(100.0, 10.0);
        queue.add_or_remove_fifo(-40.0, 12.0);
        let (volume, _) = queue.sum();
        assert_relative_eq!(volume, 60.0);
        assert_relative_eq!(average(&queue), 10.0);
    }

    #[test]
    fn test_fifo_consumes_oldest_first() {
        let mut queue = LotQueue::new();
        queue.add_or_remove_fifo(100.0, 50.0);
        queue.add_or_remove_fifo(100.0, 60.0);
        queue.add_or_remove_fifo(-150.0, 70.0);
        let lots: Vec<_> = queue.lots().copied().collect();
        assert_eq!(lots, vec![Lot::new(50.0, 60.0)]);
    }

    #[test]
    fn test_crossing_zero_restarts_with_remainder() {
        let mut queue = LotQueue::new();
        queue.add_or_remove_fifo(10.0, 5.0);
        queue.add_or_remove_fifo(-15.0, 7.0);
        let lots: Vec<_> = queue.lots().copied().collect();
        assert_eq!(lots, vec![Lot::new(-5.0, 7.0)]);
    }

    #[test]
    fn test_exact_close_empties_queue() {
        let mut queue = LotQueue::new();
        queue.add_or_remove_fifo(0.1 + 0.2, 5.0);
        queue.add_or_remove_fifo(-0.3, 6.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_lifo_removes_newest_first() {
        let mut queue = LotQueue::new();
        queue.add_or_remove_fifo(5.0, 10.0);
        queue.add_or_remove_fifo(4.0, 20.0);
        let (removed, cost) = queue.remove_lifo(6.0);
        assert_relative_eq!(removed, 6.0);
        assert_relative_eq!(cost, 4.0 * 20.0 + 2.0 * 10.0);
        assert_eq!(queue.sum(), (3.0, 30.0));
    }

    #[test]
    fn test_lifo_on_short_position() {
        let mut queue = LotQueue::new();
        queue.add_or_remove_fifo(-5.0, 10.0);
        let (removed, cost) = queue.remove_lifo(2.0);
        assert_relative_eq!(removed, -2.0);
        assert_relative_eq!(cost, -20.0);
        assert_eq!(queue.sum(), (-3.0, -30.0));
    }

    #[test]
    fn test_scale_preserves_cost() {
        let mut queue = LotQueue::new();
        queue.add_or_remove_fifo(10.0, 30.0);
        queue.scale(2.0);
        assert_eq!(queue.sum(), (20.0, 300.0));
        assert_relative_eq!(average(&queue), 15.0);
    }

    #[test]
    fn test_adjust_balance_single_running_lot() {
        let mut queue = LotQueue::new();
        queue.adjust_balance(100.0);
        queue.adjust_balance(-30.0);
        queue.adjust_balance(-80.0);
        assert_eq!(queue.len(), 1);
        assert_relative_eq!(queue.sum().0, -10.0);
        queue.adjust_balance(10.0);
        assert!(queue.is_empty());
    }
}
