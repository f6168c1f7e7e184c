//! Portfolio engine - single-writer facade over builder, timeline and projector

use crate::asset::Asset;
use crate::builder::Builder;
use crate::config::EngineConfig;
use crate::error::{PortfolioError, Result};
use crate::ordering::EventOrdering;
use crate::projector::{Projector, Snapshot};
use crate::scheduler::ForthcomingPreview;
use crate::sources::Collaborators;
use crate::timeline::{BalanceItem, EventCursor, EventHandle, Timeline};
use crate::transaction::Transaction;
use crate::types::Timestamp;
use chrono::{DateTime, Utc};

/// Point-in-time portfolio reconstruction engine
///
/// Fed transactions in time order until [`finish`](Self::finish); read at
/// any time through snapshots, handles and traversals.
#[derive(Debug)]
pub struct PortfolioEngine {
    config: EngineConfig,
    timeline: Timeline,
    builder: Option<Builder>,
    projector: Projector,
    ordering: EventOrdering,
    disposed: bool,
}

impl PortfolioEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let ordering = EventOrdering::new();
        let projector = Projector::new(collaborators.rates.clone());
        let builder = Builder::new(ordering.clone(), config.end, collaborators);
        log::info!(
            "Portfolio engine created (horizon {}, history {})",
            config.end,
            if config.retain_history { "retained" } else { "disabled" }
        );
        Self {
            timeline: Timeline::new(config.retain_history),
            config,
            builder: Some(builder),
            projector,
            ordering,
            disposed: false,
        }
    }

    /// Engine with default collaborators
    pub fn with_config(config: EngineConfig) -> Self {
        Self::new(config, Collaborators::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Comparator used to sort batches
    pub fn ordering(&self) -> &EventOrdering {
        &self.ordering
    }

    pub fn is_finished(&self) -> bool {
        self.builder.is_none()
    }

    fn check(&self) -> Result<()> {
        if self.disposed {
            Err(PortfolioError::Disposed)
        } else {
            Ok(())
        }
    }

    fn builder_mut(&mut self) -> Result<&mut Builder> {
        self.check()?;
        self.builder.as_mut().ok_or(PortfolioError::Finished)
    }

    /// Apply one transaction; returns false when it lies beyond the horizon
    pub fn ingest(&mut self, txn: Transaction) -> Result<bool> {
        self.check()?;
        let builder = self.builder.as_mut().ok_or(PortfolioError::Finished)?;
        builder.build_history(&mut self.timeline, txn)
    }

    /// Sort a batch by time and kind rank, then apply it.
    ///
    /// Returns how many transactions were applied.
    pub fn ingest_batch(&mut self, mut batch: Vec<Transaction>) -> Result<usize> {
        self.check()?;
        self.ordering.sort_batch(&mut batch);
        let mut applied = 0;
        for txn in batch {
            if self.ingest(txn)? {
                applied += 1;
            }
        }
        log::info!("Ingested batch: {} transactions applied", applied);
        Ok(applied)
    }

    /// Commit the automatic events due up to `time`
    pub fn advance_to(&mut self, time: Timestamp) -> Result<()> {
        self.check()?;
        let builder = self.builder.as_mut().ok_or(PortfolioError::Finished)?;
        builder.advance_to(&mut self.timeline, time);
        Ok(())
    }

    /// Drain everything up to the horizon and release builder state
    pub fn finish(&mut self) -> Result<()> {
        self.check()?;
        if let Some(mut builder) = self.builder.take() {
            let horizon = builder.horizon();
            builder.advance_to(&mut self.timeline, horizon);
            log::info!(
                "Engine finished: {} events, {} assets",
                self.timeline.applied_count(),
                self.timeline.asset_count()
            );
        }
        Ok(())
    }

    /// Release everything; every later call fails with `Disposed`
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.builder = None;
            self.timeline = Timeline::new(self.config.retain_history);
            log::info!("Engine disposed");
        }
    }

    pub fn timeline(&self) -> Result<&Timeline> {
        self.check()?;
        Ok(&self.timeline)
    }

    /// Handle addressing the state as of `time`
    fn handle_for(&mut self, time: Timestamp) -> Result<EventHandle> {
        self.check()?;
        if let Some(builder) = self.builder.as_mut() {
            builder.advance_to(&mut self.timeline, time);
        }
        match self.timeline.last_event().map(|event| event.time) {
            Some(last) if last > time && self.timeline.retains_history() => {
                self.timeline.handle_at(time)
            }
            Some(last) if last > time => Err(PortfolioError::HistoryDisabled(format!(
                "cannot look back to {} after applying {}",
                time, last
            ))),
            _ => Ok(self.timeline.current_handle()),
        }
    }

    /// Snapshot of the portfolio at `time`, valued at `time`
    pub fn portfolio_at(&mut self, time: Timestamp) -> Result<Snapshot> {
        let handle = self.handle_for(time)?;
        self.projector.project(&self.timeline, &handle, time)
    }

    /// Balance of one asset at `time` without projecting the whole portfolio
    pub fn balance_at(&mut self, time: Timestamp, asset: &Asset) -> Result<Option<BalanceItem>> {
        let handle = self.handle_for(time)?;
        match self.timeline.slot_of(asset) {
            Some(slot) => Projector::balance(&self.timeline, &handle, slot),
            None => Ok(None),
        }
    }

    /// Handle on the latest state; detach it before ingesting more
    pub fn current_handle(&self) -> Result<EventHandle> {
        self.check()?;
        Ok(self.timeline.current_handle())
    }

    /// Snapshot of the latest state, valued at the last event's time
    pub fn current(&self) -> Result<Snapshot> {
        let handle = self.current_handle()?;
        self.snapshot(&handle)
    }

    /// Snapshot of the state addressed by `handle`, valued at its event's time
    pub fn snapshot(&self, handle: &EventHandle) -> Result<Snapshot> {
        self.check()?;
        let time = handle
            .event()
            .and_then(|index| self.timeline.event(index))
            .map_or(DateTime::<Utc>::MIN_UTC, |event| event.time);
        self.projector.project(&self.timeline, handle, time)
    }

    /// Walk every event at or after `time`
    pub fn events_from(&self, time: Timestamp, include_leading_void: bool) -> Result<EventCursor<'_>> {
        self.check()?;
        self.timeline.events_from(time, include_leading_void)
    }

    /// Next automatic event, without committing it
    pub fn peek_next(&mut self) -> Result<Option<ForthcomingPreview>> {
        Ok(self.builder_mut()?.peek_next())
    }

    /// Number of sequences parked while their asset is dormant
    pub fn suspended_count(&self) -> Result<usize> {
        self.check()?;
        Ok(self
            .builder
            .as_ref()
            .map_or(0, |builder| builder.scheduler().suspended_len()))
    }

    /// Assets whose sequences are parked
    pub fn suspended_assets(&self) -> Result<Vec<Asset>> {
        self.check()?;
        let Some(builder) = self.builder.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(builder
            .scheduler()
            .suspended_slots()
            .filter_map(|slot| self.timeline.asset(slot).cloned())
            .collect())
    }
}
