//! Virtual-portfolio projector - turns an event handle into a snapshot
//!
//! Walks the membership bitmap of the addressed index and emits one item
//! per non-zero slot. Unless the event was USD-only, cash, deposits and
//! transaction cost are also converted to USD and summed into up to two
//! consolidated items carrying [`CONSOLIDATED_ID`].

use crate::asset::{Asset, AssetKind, CONSOLIDATED_ID};
use crate::currency::Currency;
use crate::error::Result;
use crate::sources::CurrencyConversionSource;
use crate::timeline::{BalanceItem, EventHandle, Timeline};
use crate::types::{is_material, AssetSlot, Price, Quantity, Timestamp};
use hashbrown::HashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One line of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotItem {
    pub asset: Asset,
    pub volume: Quantity,
    pub average_price: Price,
    pub deposit: f64,
    pub is_cash: bool,
}

impl SnapshotItem {
    fn from_balance(asset: Asset, item: &BalanceItem) -> Self {
        Self {
            asset,
            volume: item.volume,
            average_price: item.average_price,
            deposit: item.deposit,
            is_cash: item.is_cash,
        }
    }

    pub fn is_consolidated(&self) -> bool {
        self.asset.is_consolidated()
    }
}

/// Portfolio as of one event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Valuation time used for currency conversion
    pub time: Timestamp,
    /// Last event reflected (None = empty portfolio)
    pub event: Option<usize>,
    pub usd_only: bool,
    pub items: Vec<SnapshotItem>,
}

impl Snapshot {
    pub fn item(&self, asset: &Asset) -> Option<&SnapshotItem> {
        self.items.iter().find(|item| &item.asset == asset)
    }

    pub fn cash_items(&self) -> impl Iterator<Item = &SnapshotItem> {
        self.items.iter().filter(|item| item.is_cash)
    }

    pub fn consolidated_cash(&self) -> Option<&SnapshotItem> {
        self.item(&consolidated(AssetKind::Cash))
    }

    pub fn consolidated_cost(&self) -> Option<&SnapshotItem> {
        self.item(&consolidated(AssetKind::TransactionCost))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Portfolio at {} ({} items)", self.time, self.items.len())?;
        for item in &self.items {
            writeln!(
                f,
                "  {:<28} {:>16.4} @ {:>12.4}  deposit {:>14.2}",
                item.asset.to_string(),
                item.volume,
                item.average_price,
                item.deposit
            )?;
        }
        Ok(())
    }
}

fn consolidated(kind: AssetKind) -> Asset {
    Asset::new(kind, CONSOLIDATED_ID, Currency::USD, "")
}

#[derive(Debug, Default)]
struct UsdTotals {
    cash: f64,
    deposit: f64,
    cost: f64,
}

/// Builds snapshots from event handles
#[derive(Clone)]
pub struct Projector {
    rates: Arc<dyn CurrencyConversionSource>,
}

impl Projector {
    pub fn new(rates: Arc<dyn CurrencyConversionSource>) -> Self {
        Self { rates }
    }

    /// Snapshot of the state addressed by `handle`, converting at `valuation_time`
    pub fn project(
        &self,
        timeline: &Timeline,
        handle: &EventHandle,
        valuation_time: Timestamp,
    ) -> Result<Snapshot> {
        let usd_only = handle
            .event()
            .and_then(|index| timeline.event(index))
            .map_or(true, |event| event.usd_only);

        handle.with_index(|index| {
            let mut items = Vec::with_capacity(index.live_count() + 2);
            let mut totals = UsdTotals::default();
            let mut rates: HashMap<Currency, f64> = HashMap::new();

            for slot in index.live_slots() {
                let (Some(item), Some(asset)) = (timeline.item(index.item_of(slot)), timeline.asset(slot))
                else {
                    continue;
                };
                if !usd_only && asset.is_cash() {
                    let rate = *rates
                        .entry(asset.currency)
                        .or_insert_with(|| self.rates.usd_rate(asset.currency, valuation_time));
                    if asset.kind == AssetKind::Cash {
                        totals.cash += item.volume * rate;
                        totals.deposit += item.deposit * rate;
                    } else {
                        totals.cost += item.volume * rate;
                    }
                }
                items.push(SnapshotItem::from_balance(asset.clone(), item));
            }

            if !usd_only {
                if is_material(totals.cash) || is_material(totals.deposit) {
                    items.push(SnapshotItem {
                        asset: consolidated(AssetKind::Cash),
                        volume: totals.cash,
                        average_price: 1.0,
                        deposit: totals.deposit,
                        is_cash: true,
                    });
                }
                if is_material(totals.cost) {
                    items.push(SnapshotItem {
                        asset: consolidated(AssetKind::TransactionCost),
                        volume: totals.cost,
                        average_price: 1.0,
                        deposit: 0.0,
                        is_cash: true,
                    });
                }
            }

            Snapshot {
                time: valuation_time,
                event: handle.event(),
                usd_only,
                items,
            }
        })
    }

    /// Balance of one slot, read straight from the index
    pub fn balance(timeline: &Timeline, handle: &EventHandle, slot: AssetSlot) -> Result<Option<BalanceItem>> {
        Ok(handle
            .live_item(slot)?
            .and_then(|index| timeline.item(index))
            .copied())
    }
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projector").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{ExplodingRates, InMemoryRates};
    use crate::timeline::EventKind;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn cash_item(slot: AssetSlot, volume: f64, deposit: f64) -> BalanceItem {
        BalanceItem {
            asset_slot: slot,
            volume,
            average_price: 1.0,
            deposit,
            is_cash: true,
            is_nonzero: volume != 0.0 || deposit != 0.0,
            event: 0,
        }
    }

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 3, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_usd_only_skips_conversion() {
        let mut timeline = Timeline::new(true);
        let (usd, _) = timeline.register_asset(&Asset::cash(Currency::USD));
        timeline.append_event(
            EventKind::Transaction,
            t0(),
            usd,
            None,
            vec![cash_item(usd, 100.0, 100.0)],
            true,
        );

        let projector = Projector::new(Arc::new(ExplodingRates::new()));
        let snapshot = projector.project(&timeline, &timeline.current_handle(), t0()).unwrap();
        assert!(snapshot.usd_only);
        assert_eq!(snapshot.items.len(), 1);
        assert!(snapshot.consolidated_cash().is_none());
    }

    #[test]
    fn test_consolidates_foreign_cash() {
        let mut timeline = Timeline::new(true);
        let (usd, _) = timeline.register_asset(&Asset::cash(Currency::USD));
        let (eur, _) = timeline.register_asset(&Asset::cash(Currency::EUR));
        let (cost, _) = timeline.register_asset(&Asset::transaction_cost(Currency::EUR));
        timeline.append_event(
            EventKind::Transaction,
            t0(),
            eur,
            None,
            vec![
                cash_item(usd, 100.0, 100.0),
                cash_item(eur, 50.0, 50.0),
                cash_item(cost, 2.0, 0.0),
            ],
            false,
        );

        let mut rates = InMemoryRates::new();
        rates.add_rate(Currency::EUR, t0(), 1.2);
        let projector = Projector::new(Arc::new(rates));
        let snapshot = projector.project(&timeline, &timeline.current_handle(), t0()).unwrap();

        let total = snapshot.consolidated_cash().unwrap();
        assert_relative_eq!(total.volume, 160.0);
        assert_relative_eq!(total.deposit, 160.0);
        assert_relative_eq!(snapshot.consolidated_cost().unwrap().volume, 2.4);
        assert!(total.is_consolidated());
    }

    #[test]
    fn test_missing_rate_stays_visible_as_nan() {
        let mut timeline = Timeline::new(true);
        let (gbp, _) = timeline.register_asset(&Asset::cash(Currency::GBP));
        timeline.append_event(
            EventKind::Transaction,
            t0(),
            gbp,
            None,
            vec![cash_item(gbp, 10.0, 10.0)],
            false,
        );
        let projector = Projector::new(Arc::new(InMemoryRates::new()));
        let snapshot = projector.project(&timeline, &timeline.current_handle(), t0()).unwrap();
        assert!(snapshot.consolidated_cash().unwrap().volume.is_nan());
    }

    #[test]
    fn test_balance_fast_path() {
        let mut timeline = Timeline::new(true);
        let (usd, _) = timeline.register_asset(&Asset::cash(Currency::USD));
        timeline.append_event(
            EventKind::Transaction,
            t0(),
            usd,
            None,
            vec![cash_item(usd, 42.0, 42.0)],
            true,
        );
        let handle = timeline.current_handle();
        let item = Projector::balance(&timeline, &handle, usd).unwrap().unwrap();
        assert_eq!(item.volume, 42.0);
        assert!(Projector::balance(&timeline, &handle, 7).unwrap().is_none());
    }
}
