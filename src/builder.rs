//! History builder - applies transactions and automatic events to the
//! account ledger and commits the resulting balance deltas to the timeline
//!
//! Every explicit transaction first drains the scheduler of whatever is
//! due at or before its time, so corporate actions dated on a trade's
//! timestamp settle before the trade.

use crate::asset::{Asset, AssetKind};
use crate::error::{PortfolioError, Result};
use crate::ledger::{Account, AccountArena, OptionTerms};
use crate::ordering::{kind_rank, EventOrdering};
use crate::scheduler::{
    CorporateActionSequence, DeferredExercise, ForthcomingEvents, ForthcomingPreview, Scheduler,
};
use crate::sources::{Collaborators, CorporateAction, OptionMetadata};
use crate::timeline::{EventKind, Timeline};
use crate::transaction::{Transaction, TransactionKind};
use crate::types::{is_material, is_zero, snap_to_integer, AssetSlot, Timestamp};
use hashbrown::HashSet;

/// Builder-only state: accounts, scheduler and collaborators
#[derive(Debug)]
pub struct Builder {
    accounts: AccountArena,
    scheduler: Scheduler,
    collaborators: Collaborators,
    /// Non-USD slots currently carrying a non-zero balance
    non_usd: HashSet<AssetSlot>,
    watermark: Option<Timestamp>,
    /// Kind rank of the last transaction applied at `watermark`
    watermark_rank: u8,
}

impl Builder {
    pub fn new(ordering: EventOrdering, horizon: Timestamp, collaborators: Collaborators) -> Self {
        Self {
            accounts: AccountArena::new(),
            scheduler: Scheduler::new(ordering, horizon),
            collaborators,
            non_usd: HashSet::new(),
            watermark: None,
            watermark_rank: 0,
        }
    }

    pub fn horizon(&self) -> Timestamp {
        self.scheduler.horizon()
    }

    pub fn ordering(&self) -> &EventOrdering {
        self.scheduler.ordering()
    }

    pub fn accounts(&self) -> &AccountArena {
        &self.accounts
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Latest time processed so far
    pub fn watermark(&self) -> Option<Timestamp> {
        self.watermark
    }

    /// Apply one transaction after draining the automatic events due before it.
    ///
    /// Transactions must arrive in (time, kind rank) order: an earlier time,
    /// or the same time with a lower rank than the last applied one, fails
    /// with `OutOfOrder`. Returns false when the transaction lies beyond the
    /// horizon and was ignored.
    pub fn build_history(&mut self, timeline: &mut Timeline, txn: Transaction) -> Result<bool> {
        if txn.time > self.horizon() {
            log::debug!("Ignoring transaction {} beyond the horizon", txn.id);
            return Ok(false);
        }
        let rank = kind_rank(txn.kind);
        let floor = match self.watermark {
            Some(last) if txn.time < last => {
                return Err(PortfolioError::OutOfOrder {
                    time: txn.time,
                    last,
                })
            }
            Some(last) if txn.time == last => {
                if rank < self.watermark_rank {
                    return Err(PortfolioError::OutOfOrder {
                        time: txn.time,
                        last,
                    });
                }
                self.watermark_rank
            }
            _ => 0,
        };

        self.drain_until(timeline, txn.time);
        self.watermark = Some(txn.time);
        // Skipped kinds do not hold back the rest of their instant
        self.watermark_rank = if txn.kind == TransactionKind::Unsupported {
            floor
        } else {
            rank
        };
        self.apply_transaction(timeline, txn);
        Ok(true)
    }

    /// Commit every automatic event due at or before `time` (clamped to the
    /// horizon) and move the watermark there.
    pub fn advance_to(&mut self, timeline: &mut Timeline, time: Timestamp) {
        let time = time.min(self.horizon());
        self.drain_until(timeline, time);
        if self.watermark.map_or(true, |last| last < time) {
            self.watermark = Some(time);
            self.watermark_rank = 0;
        }
    }

    fn drain_until(&mut self, timeline: &mut Timeline, time: Timestamp) {
        while let Some(entry) = self.scheduler.pop_due(time) {
            let mut events = entry.events;
            if let Some(slot) = events.dormancy_slot() {
                if self.accounts.is_dormant(slot) {
                    self.scheduler.suspend(slot, events);
                    continue;
                }
            }

            match &events {
                ForthcomingEvents::Corporate(sequence) => {
                    if let Some(action) = sequence.current().copied() {
                        self.apply_corporate_action(timeline, sequence.slot(), &action);
                    }
                }
                ForthcomingEvents::Exercise(exercise) => {
                    let settlement = exercise.settlement();
                    log::debug!("Settling exercise of slot {}: {:?}", exercise.option_slot, settlement);
                    self.apply_trade(timeline, settlement);
                }
            }
            events.advance();
            self.scheduler.push(events);
        }
    }

    /// Next automatic event that would change the portfolio
    pub fn peek_next(&mut self) -> Option<ForthcomingPreview> {
        let accounts = &self.accounts;
        self.scheduler.peek(
            |slot| accounts.is_dormant(slot),
            |events| Self::is_effective(accounts, events),
        )
    }

    fn is_effective(accounts: &AccountArena, events: &ForthcomingEvents) -> bool {
        match events {
            ForthcomingEvents::Exercise(_) => true,
            ForthcomingEvents::Corporate(sequence) => {
                let (Some(action), Some(account)) = (sequence.current(), accounts.get(sequence.slot()))
                else {
                    return false;
                };
                let volume = account.volume();
                if is_zero(volume) {
                    return false;
                }
                if action.is_split {
                    let ratio = action.ratio();
                    ratio.is_finite() && ratio > 0.0 && ratio != 1.0
                } else {
                    is_material(volume * action.dividend_or_price)
                }
            }
        }
    }

    /// Slot of `asset`, creating its account (and the accounts it links to)
    /// on first sight.
    fn account_slot(&mut self, timeline: &mut Timeline, asset: &Asset, time: Timestamp) -> AssetSlot {
        if let Some(slot) = timeline.slot_of(asset) {
            return slot;
        }

        let cash_slot = if asset.kind == AssetKind::Cash {
            None
        } else {
            Some(self.account_slot(timeline, &Asset::cash(asset.currency), time))
        };
        let mut account = Account::new(asset.clone(), cash_slot);
        let mut underlying_slot = None;

        match asset.kind {
            AssetKind::Future => {
                account.multiplier = self.collaborators.futures.multiplier(asset).unwrap_or_else(|| {
                    log::warn!("No multiplier for future {}; assuming 1", asset);
                    1.0
                });
            }
            AssetKind::Option => {
                let metadata = self.collaborators.options.option_metadata(asset).unwrap_or_else(|| {
                    log::warn!("No metadata for option {}; assuming a call with multiplier 100", asset);
                    OptionMetadata::degraded()
                });
                underlying_slot = metadata
                    .underlying
                    .as_ref()
                    .map(|underlying| self.account_slot(timeline, underlying, time));
                account.multiplier = metadata.multiplier;
                account.terms = Some(OptionTerms {
                    is_call: metadata.is_call,
                    strike: metadata.strike,
                    underlying: underlying_slot,
                });
            }
            _ => {}
        }

        let (slot, _) = timeline.register_asset(asset);
        let pushed = self.accounts.push(account);
        debug_assert_eq!(slot, pushed);

        if let Some(underlying) = underlying_slot.and_then(|u| self.accounts.get_mut(u)) {
            underlying.options.push(slot);
        }

        if asset.kind == AssetKind::Stock {
            let id = self.scheduler.allocate_id();
            let sequence = CorporateActionSequence::new(
                id,
                asset.clone(),
                slot,
                self.collaborators.corporate_actions.clone(),
                time,
                self.horizon(),
            );
            self.scheduler.push(ForthcomingEvents::Corporate(sequence));
        }
        log::debug!("Opened account for {} in slot {}", asset, slot);
        slot
    }

    fn apply_transaction(&mut self, timeline: &mut Timeline, txn: Transaction) {
        if txn.volume < 0.0 {
            log::warn!("Skipping transaction {} with negative volume {}", txn.id, txn.volume);
            return;
        }

        match txn.kind {
            TransactionKind::Unsupported => {
                log::warn!("Skipping transaction {} of unsupported kind", txn.id);
            }
            TransactionKind::Deposit | TransactionKind::Withdraw => {
                let slot = self.account_slot(timeline, &Asset::cash(txn.asset.currency), txn.time);
                let amount = txn.kind.position_sign() * txn.volume;
                if let Some(cash) = self.accounts.get_mut(slot) {
                    cash.adjust_balance(amount);
                    cash.add_deposit(amount);
                    cash.last_transaction = Some(txn.clone());
                }
                self.commit(timeline, EventKind::Transaction, txn.time, slot, Some(txn), &[slot]);
            }
            TransactionKind::TransactionCost => {
                let currency = txn.asset.currency;
                let cost = self.account_slot(timeline, &Asset::transaction_cost(currency), txn.time);
                let cash = self.account_slot(timeline, &Asset::cash(currency), txn.time);
                if let Some(account) = self.accounts.get_mut(cash) {
                    account.adjust_balance(-txn.volume);
                }
                if let Some(account) = self.accounts.get_mut(cost) {
                    account.adjust_balance(txn.volume);
                    account.last_transaction = Some(txn.clone());
                }
                self.commit(timeline, EventKind::Transaction, txn.time, cost, Some(txn), &[cost, cash]);
            }
            TransactionKind::ExerciseOption => self.apply_exercise(timeline, txn),
            TransactionKind::WriteOption | TransactionKind::BuybackWrittenOption
                if txn.asset.kind != AssetKind::Option =>
            {
                log::warn!("Skipping {:?} on non-option asset {}", txn.kind, txn.asset);
            }
            _ if txn.asset.is_cash() => {
                log::warn!("Skipping {:?} on cash asset {}", txn.kind, txn.asset);
            }
            _ => self.apply_trade(timeline, txn),
        }
    }

    fn apply_trade(&mut self, timeline: &mut Timeline, txn: Transaction) {
        let slot = self.account_slot(timeline, &txn.asset, txn.time);
        let signed = txn.signed_volume();
        let Some(account) = self.accounts.get_mut(slot) else {
            return;
        };
        let cash_slot = account.cash_slot;
        let notional = signed * txn.price * account.multiplier;
        account.apply_trade(signed, txn.price);
        account.last_transaction = Some(txn.clone());

        let mut touched = vec![slot];
        if let Some(cash_slot) = cash_slot {
            if let Some(cash) = self.accounts.get_mut(cash_slot) {
                cash.adjust_balance(-notional);
            }
            touched.push(cash_slot);
        }

        let time = txn.time;
        self.commit(timeline, EventKind::Transaction, time, slot, Some(txn), &touched);
        self.resume_if_active(slot, time);
    }

    /// Requeue parked sequences of `slot` and of its underlying once either
    /// holds a position again.
    fn resume_if_active(&mut self, slot: AssetSlot, time: Timestamp) {
        let underlying = self
            .accounts
            .get(slot)
            .and_then(|account| account.terms.as_ref())
            .and_then(|terms| terms.underlying);
        for candidate in std::iter::once(slot).chain(underlying) {
            if !self.accounts.is_dormant(candidate) {
                self.scheduler.resume(candidate, time);
            }
        }
    }

    fn apply_exercise(&mut self, timeline: &mut Timeline, txn: Transaction) {
        if txn.asset.kind != AssetKind::Option {
            log::warn!("Skipping exercise of non-option asset {}", txn.asset);
            return;
        }
        if !txn.price.is_nan() && txn.price != 0.0 {
            log::warn!("Skipping exercise {} with non-zero price {}", txn.id, txn.price);
            return;
        }
        let Some(slot) = timeline.slot_of(&txn.asset) else {
            log::warn!("Skipping exercise of {} without a position", txn.asset);
            return;
        };
        let Some(account) = self.accounts.get_mut(slot) else {
            return;
        };
        let position = account.volume();
        if is_zero(position) {
            log::warn!("Skipping exercise of {} without a position", txn.asset);
            return;
        }

        let exercised = txn.volume.min(position.abs());
        if is_zero(exercised) {
            log::warn!("Skipping exercise {} of zero volume", txn.id);
            return;
        }
        let long = position > 0.0;
        account.apply_trade(-position.signum() * exercised, 0.0);
        account.last_transaction = Some(txn.clone());
        let multiplier = account.multiplier;
        let terms = account.terms.clone();

        let time = txn.time;
        let exchange = txn.asset.exchange.clone();
        self.commit(timeline, EventKind::Transaction, time, slot, Some(txn), &[slot]);

        let Some(terms) = terms else {
            return;
        };
        let Some(underlying) = terms.underlying.and_then(|u| timeline.asset(u)).cloned() else {
            log::warn!("Option in slot {} has no known underlying; delivery skipped", slot);
            return;
        };

        let direction = if terms.is_call { 1.0 } else { -1.0 };
        let side = if long { 1.0 } else { -1.0 };
        let shares = exercised * multiplier * direction * side;
        let delivery = self.collaborators.calendar.next_market_open(time, &exchange);
        let id = self.scheduler.allocate_id();
        log::debug!("Scheduling delivery of {} {} at {}", shares, underlying, delivery);
        self.scheduler.push(ForthcomingEvents::Exercise(DeferredExercise::new(
            id,
            delivery,
            slot,
            underlying,
            shares,
            terms.strike,
        )));
    }

    fn apply_corporate_action(&mut self, timeline: &mut Timeline, slot: AssetSlot, action: &CorporateAction) {
        let Some(account) = self.accounts.get_mut(slot) else {
            return;
        };
        let volume = account.volume();
        if is_zero(volume) {
            return;
        }
        let cash_slot = account.cash_slot;
        let multiplier = account.multiplier;

        let (kind, cash_delta, touched) = if action.is_split {
            let ratio = action.ratio();
            if !ratio.is_finite() || ratio <= 0.0 {
                log::warn!("Skipping split of {} with ratio {}", account.asset, ratio);
                return;
            }
            if ratio == 1.0 {
                return;
            }

            let scaled = snap_to_integer(volume * ratio);
            let remainder = (scaled - scaled.trunc()) / ratio;
            let mut cash_delta = 0.0;
            if is_material(remainder) {
                let (removed, removed_cost) = account.lots_mut().remove_lifo(remainder);
                let price = if action.dividend_or_price.is_nan() {
                    removed_cost / removed
                } else {
                    action.dividend_or_price
                };
                account.add_deposit(-removed_cost.abs() * multiplier);
                cash_delta = removed * price * multiplier;
            }
            account.lots_mut().scale(ratio);
            (EventKind::Split, cash_delta, vec![slot])
        } else {
            let amount = volume * action.dividend_or_price * multiplier;
            if is_zero(amount) {
                return;
            }
            (EventKind::Dividend, amount, Vec::new())
        };

        let mut touched = touched;
        if let Some(cash_slot) = cash_slot {
            if kind == EventKind::Dividend || cash_delta != 0.0 {
                if let Some(cash) = self.accounts.get_mut(cash_slot) {
                    cash.adjust_balance(cash_delta);
                }
                touched.push(cash_slot);
            }
        }
        let transaction = self.accounts.get(slot).and_then(|a| a.last_transaction.clone());
        self.commit(timeline, kind, action.time, slot, transaction, &touched);
    }

    /// Append one event carrying the current balances of `slots`
    fn commit(
        &mut self,
        timeline: &mut Timeline,
        kind: EventKind,
        time: Timestamp,
        slot: AssetSlot,
        transaction: Option<Transaction>,
        slots: &[AssetSlot],
    ) {
        let mut deltas = Vec::with_capacity(slots.len());
        for &s in slots {
            let Some(account) = self.accounts.get(s) else {
                continue;
            };
            let item = account.balance_item(s);
            if !account.asset.currency.is_usd() {
                if item.is_nonzero {
                    self.non_usd.insert(s);
                } else {
                    self.non_usd.remove(&s);
                }
            }
            deltas.push(item);
        }
        let usd_only = self.non_usd.is_empty();
        timeline.append_event(kind, time, slot, transaction, deltas, usd_only);
    }
}
