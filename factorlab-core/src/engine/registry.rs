//! Shared, insertion-ordered instrument registries.
//!
//! Pipelines, strategies, and the broker all hold clones of the same
//! registry handle, received before the caller populates it. Instruments
//! registered later are visible through every clone; the engine relies on
//! this when `add_asset` calls arrive after construction.
//!
//! Single-threaded by design, so the handles are `Rc<RefCell<…>>`.

use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle over a [`Registry`].
pub type SharedRegistry<T> = Rc<RefCell<Registry<T>>>;

/// Shared handle over a single instrument.
pub type SharedEntry<T> = Rc<RefCell<T>>;

/// Ticker-keyed collection preserving insertion order.
///
/// Insertion order is load-bearing: the first base registered is the
/// primary base and the last is the hedge base.
#[derive(Debug)]
pub struct Registry<T> {
    entries: Vec<(String, SharedEntry<T>)>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A fresh shared handle over an empty registry.
    pub fn shared() -> SharedRegistry<T> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Register `value` under `ticker`. A duplicate ticker replaces the
    /// existing entry in place, keeping its position.
    pub fn insert(&mut self, ticker: &str, value: T) -> SharedEntry<T> {
        let entry = Rc::new(RefCell::new(value));
        if let Some(slot) = self.entries.iter_mut().find(|(t, _)| t == ticker) {
            slot.1 = Rc::clone(&entry);
        } else {
            self.entries.push((ticker.to_string(), Rc::clone(&entry)));
        }
        entry
    }

    pub fn get(&self, ticker: &str) -> Option<SharedEntry<T>> {
        self.entries
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, e)| Rc::clone(e))
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.entries.iter().any(|(t, _)| t == ticker)
    }

    /// First-registered entry.
    pub fn first(&self) -> Option<SharedEntry<T>> {
        self.entries.first().map(|(_, e)| Rc::clone(e))
    }

    /// Last-registered entry.
    pub fn last(&self) -> Option<SharedEntry<T>> {
        self.entries.last().map(|(_, e)| Rc::clone(e))
    }

    pub fn tickers(&self) -> Vec<String> {
        self.entries.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedEntry<T>)> {
        self.entries.iter().map(|(t, e)| (t.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply `f` to every entry in registration order.
    pub fn for_each_mut(&self, mut f: impl FnMut(&str, &mut T)) {
        for (ticker, entry) in &self.entries {
            f(ticker, &mut entry.borrow_mut());
        }
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
