//! Balance index - versioned slot → balance-item map with a membership bitmap
//!
//! One `u32` buffer holds both parts: the first `capacity` words map an
//! asset slot to its most recent balance-item index (0 = none), and the
//! trailing words are the bitmap of slots whose balance is non-zero.
//!
//! Buffers are shared through `Rc` between their writer and any number of
//! [`EventHandle`]s. Every in-place write bumps the buffer's generation, and
//! a handle still aliasing the buffer with an older generation refuses to
//! read. Readers that need to outlive further writes call
//! [`EventHandle::detach`] to take a private copy.

use super::bitmap::{self, SetBits};
use crate::error::{PortfolioError, Result};
use crate::types::AssetSlot;
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

const MIN_CAPACITY: usize = 32;

/// Contents of a balance index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexData {
    capacity: usize,
    words: Vec<u32>,
}

impl IndexData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of addressable slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bitmap(&self) -> &[u32] {
        &self.words[self.capacity..]
    }

    fn bitmap_mut(&mut self) -> &mut [u32] {
        let capacity = self.capacity;
        &mut self.words[capacity..]
    }

    /// Re-lay the buffer out for at least `slots` slots
    fn grow(&mut self, slots: usize) {
        if slots <= self.capacity {
            return;
        }
        let capacity = slots.max(self.capacity * 2).max(MIN_CAPACITY);
        let mut words = vec![0u32; capacity + bitmap::words_for(capacity)];
        words[..self.capacity].copy_from_slice(&self.words[..self.capacity]);
        let old_bitmap = self.bitmap();
        words[capacity..capacity + old_bitmap.len()].copy_from_slice(old_bitmap);
        self.capacity = capacity;
        self.words = words;
    }

    /// Point `slot` at `item` and record whether it is live
    pub fn set(&mut self, slot: AssetSlot, item: usize, live: bool) {
        self.grow(slot + 1);
        self.words[slot] = item as u32;
        bitmap::set(self.bitmap_mut(), slot, live);
    }

    /// Most recent item of `slot` (0 when the slot never had one)
    pub fn item_of(&self, slot: AssetSlot) -> usize {
        if slot < self.capacity {
            self.words[slot] as usize
        } else {
            0
        }
    }

    pub fn is_live(&self, slot: AssetSlot) -> bool {
        slot < self.capacity && bitmap::get(self.bitmap(), slot)
    }

    /// Live slots in ascending order
    pub fn live_slots(&self) -> SetBits<'_> {
        SetBits::new(self.bitmap())
    }

    pub fn live_count(&self) -> usize {
        bitmap::count_ones(self.bitmap())
    }
}

/// Shared, versioned balance index
#[derive(Debug, Default)]
pub struct IndexBuffer {
    generation: Cell<u64>,
    data: RefCell<IndexData>,
}

impl IndexBuffer {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn from_data(data: IndexData) -> Rc<Self> {
        Rc::new(Self {
            generation: Cell::new(0),
            data: RefCell::new(data),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Apply one event's worth of writes in place and bump the generation once
    pub fn apply<I>(&self, writes: I)
    where
        I: IntoIterator<Item = (AssetSlot, usize, bool)>,
    {
        let mut data = self.data.borrow_mut();
        for (slot, item, live) in writes {
            data.set(slot, item, live);
        }
        self.generation.set(self.generation.get() + 1);
    }

    pub(crate) fn data(&self) -> Ref<'_, IndexData> {
        self.data.borrow()
    }
}

/// Read cursor addressing the portfolio state right after one event
#[derive(Debug, Clone)]
pub struct EventHandle {
    buffer: Rc<IndexBuffer>,
    generation: u64,
    event: Option<usize>,
    void: bool,
    detached: bool,
}

impl EventHandle {
    /// Handle aliasing `buffer` at its current generation
    pub(crate) fn aliasing(buffer: &Rc<IndexBuffer>, event: Option<usize>, void: bool) -> Self {
        Self {
            buffer: Rc::clone(buffer),
            generation: buffer.generation(),
            event,
            void,
            detached: false,
        }
    }

    /// Handle owning a private buffer
    pub(crate) fn owning(data: IndexData, event: Option<usize>) -> Self {
        let buffer = IndexBuffer::from_data(data);
        Self {
            generation: buffer.generation(),
            buffer,
            event,
            void: false,
            detached: true,
        }
    }

    /// Last event applied to the addressed state (None = empty portfolio)
    pub fn event(&self) -> Option<usize> {
        self.event
    }

    /// True for the explicit leading handle of a traversal
    pub fn is_void(&self) -> bool {
        self.void
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once the aliased buffer moved on without this handle detaching
    pub fn is_valid(&self) -> bool {
        self.buffer.generation() == self.generation
    }

    fn check(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(PortfolioError::StaleHandle {
                captured: self.generation,
                current: self.buffer.generation(),
            })
        }
    }

    /// Copy the addressed state into a private buffer so the handle stays
    /// valid across further writes to the buffer it came from.
    pub fn detach(&self) -> Result<EventHandle> {
        self.check()?;
        if self.detached {
            return Ok(self.clone());
        }
        let data = self.buffer.data().clone();
        let mut handle = EventHandle::owning(data, self.event);
        handle.void = self.void;
        Ok(handle)
    }

    /// Run `f` against the addressed index, failing on a stale handle
    pub fn with_index<R>(&self, f: impl FnOnce(&IndexData) -> R) -> Result<R> {
        self.check()?;
        let data = self.buffer.data();
        Ok(f(&data))
    }

    /// Item index of `slot` when it is live
    pub fn live_item(&self, slot: AssetSlot) -> Result<Option<usize>> {
        self.with_index(|index| index.is_live(slot).then(|| index.item_of(slot)))
    }
}
