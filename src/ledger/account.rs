//! Per-asset working state used while the timeline is being built

use super::lots::LotQueue;
use crate::asset::Asset;
use crate::timeline::BalanceItem;
use crate::transaction::Transaction;
use crate::types::{is_zero, AssetSlot, Price, Quantity};

/// Contract terms of an option account
#[derive(Debug, Clone, PartialEq)]
pub struct OptionTerms {
    pub is_call: bool,
    pub strike: Price,
    /// Slot of the underlying, when known
    pub underlying: Option<AssetSlot>,
}

/// Account - the builder's bookkeeping for one asset
#[derive(Debug, Clone)]
pub struct Account {
    /// Asset held
    pub asset: Asset,
    lots: LotQueue,
    deposit: f64,
    /// Contract multiplier applied to cash settlement
    pub multiplier: f64,
    /// Cash account of the asset's currency (None for cash-like accounts)
    pub cash_slot: Option<AssetSlot>,
    /// Options written on this asset
    pub options: Vec<AssetSlot>,
    /// Set for option accounts
    pub terms: Option<OptionTerms>,
    /// Most recent explicit transaction on this asset
    pub last_transaction: Option<Transaction>,
}

impl Account {
    pub fn new(asset: Asset, cash_slot: Option<AssetSlot>) -> Self {
        Self {
            asset,
            lots: LotQueue::new(),
            deposit: 0.0,
            multiplier: 1.0,
            cash_slot,
            options: Vec::new(),
            terms: None,
            last_transaction: None,
        }
    }

    pub fn lots(&self) -> &LotQueue {
        &self.lots
    }

    pub fn lots_mut(&mut self) -> &mut LotQueue {
        &mut self.lots
    }

    pub fn volume(&self) -> Quantity {
        self.lots.sum().0
    }

    /// Volume-weighted average price, 0 for an empty position
    pub fn average_price(&self) -> Price {
        let (volume, total) = self.lots.sum();
        if is_zero(volume) {
            0.0
        } else {
            total / volume
        }
    }

    pub fn deposit(&self) -> f64 {
        self.deposit
    }

    pub fn is_flat(&self) -> bool {
        is_zero(self.volume())
    }

    /// Cash-style balance change
    pub fn adjust_balance(&mut self, delta: f64) {
        self.lots.adjust_balance(delta);
    }

    /// Cash-style deposit change
    pub fn add_deposit(&mut self, delta: f64) {
        self.deposit += delta;
    }

    /// Apply a signed position change at `price`.
    ///
    /// Position-increasing changes add their gross cost to the deposit; the
    /// deposit resets when the position closes and restarts at the cost of
    /// the remainder when it crosses zero.
    pub fn apply_trade(&mut self, signed_volume: Quantity, price: Price) {
        let before = self.volume();
        let increasing = is_zero(before) || before.signum() == signed_volume.signum();
        if increasing {
            self.deposit += signed_volume.abs() * price * self.multiplier;
        }

        self.lots.add_or_remove_fifo(signed_volume, price);

        let after = self.volume();
        if is_zero(after) {
            self.lots.clear();
            self.deposit = 0.0;
        } else if !increasing && after.signum() != before.signum() {
            self.deposit = after.abs() * price * self.multiplier;
        }
    }

    /// Snapshot this account into a balance delta for `slot`
    pub fn balance_item(&self, slot: AssetSlot) -> BalanceItem {
        let volume = self.volume();
        let cash = self.asset.is_cash();
        BalanceItem {
            asset_slot: slot,
            volume,
            average_price: if cash { 1.0 } else { self.average_price() },
            deposit: self.deposit,
            is_cash: cash,
            is_nonzero: !is_zero(volume) || (cash && !is_zero(self.deposit)),
            event: 0,
        }
    }
}

/// Index-addressed arena of accounts.
///
/// Accounts reference each other (option ↔ underlying, asset → cash) by
/// slot, never by pointer.
#[derive(Debug, Clone, Default)]
pub struct AccountArena {
    accounts: Vec<Account>,
}

impl AccountArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Append an account; returns its slot
    pub fn push(&mut self, account: Account) -> AssetSlot {
        self.accounts.push(account);
        self.accounts.len() - 1
    }

    pub fn get(&self, slot: AssetSlot) -> Option<&Account> {
        self.accounts.get(slot)
    }

    pub fn get_mut(&mut self, slot: AssetSlot) -> Option<&mut Account> {
        self.accounts.get_mut(slot)
    }

    /// An asset is dormant when it and every option written on it are flat
    pub fn is_dormant(&self, slot: AssetSlot) -> bool {
        let Some(account) = self.get(slot) else {
            return true;
        };
        account.is_flat()
            && account
                .options
                .iter()
                .all(|&option| self.get(option).map(Account::is_flat).unwrap_or(true))
    }
}
