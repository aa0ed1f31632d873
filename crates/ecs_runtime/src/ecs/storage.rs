//! Per-type component storage
//!
//! Each store is a parallel array with one cell per entity slot, dead slots
//! included, so a component lookup is a direct index. Whether a cell is
//! logically present is decided by the owning slot's component mask, not by
//! the store.
//!
//! Stores also remember which cells were handed out mutably, so consumers
//! that cache derived state (the transform hierarchy) can tell which
//! instances may have been rewritten behind their back.

use std::any::Any;

use fixedbitset::FixedBitSet;

use super::Component;

/// Dense storage for one component type
#[derive(Debug)]
pub struct ComponentStore<T: Component> {
    cells: Vec<T>,
    just_added: FixedBitSet,
    changed: FixedBitSet,
}

fn flag(set: &mut FixedBitSet, index: usize) {
    if index >= set.len() {
        set.grow(index + 1);
    }
    set.insert(index);
}

impl<T: Component> ComponentStore<T> {
    /// Create a store holding `len` default instances
    pub(crate) fn with_len(len: usize) -> Self {
        let mut cells = Vec::with_capacity(len);
        cells.resize_with(len, T::default);
        Self {
            cells,
            just_added: FixedBitSet::with_capacity(len),
            changed: FixedBitSet::with_capacity(len),
        }
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the store has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell at a slot index
    pub fn get(&self, index: usize) -> Option<&T> {
        self.cells.get(index)
    }

    /// Mutable cell at a slot index; the cell is flagged as changed
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let cell = self.cells.get_mut(index)?;
        flag(&mut self.changed, index);
        Some(cell)
    }

    /// Whether the cell was handed out mutably since changes were last drained
    pub fn is_changed(&self, index: usize) -> bool {
        self.changed.contains(index)
    }

    /// Mutable cell without flagging it, for owners that track edits themselves
    pub(crate) fn cell_mut(&mut self, index: usize) -> Option<&mut T> {
        self.cells.get_mut(index)
    }

    /// Indices flagged as changed, clearing the flags
    pub(crate) fn drain_changed(&mut self) -> Vec<usize> {
        let changed = self.changed.ones().collect();
        self.changed.clear();
        changed
    }

    /// Move the instance out, leaving a default in its place
    pub(crate) fn take(&mut self, index: usize) -> Option<T> {
        self.cells.get_mut(index).map(std::mem::take)
    }

    /// Put an instance back into its cell
    pub(crate) fn put(&mut self, index: usize, value: T) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = value;
            flag(&mut self.changed, index);
        }
    }
}

/// Object-safe view over a `ComponentStore<T>`
#[doc(hidden)]
pub trait AnyStore: Any + Send + Sync {
    fn len(&self) -> usize;

    /// Append default cells until the store has `len` cells
    fn grow_to(&mut self, len: usize);

    /// Run the destruction hook of the instance in `index`
    fn destroy_cell(&mut self, index: usize);

    /// Replace the instance in `index` with a fresh default and flag it as just added
    fn reset_cell(&mut self, index: usize);

    /// Clear the just-added flag, returning whether it was set
    fn take_just_added(&mut self, index: usize) -> bool;

    fn is_just_added(&self, index: usize) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> AnyStore for ComponentStore<T> {
    fn len(&self) -> usize {
        self.cells.len()
    }

    fn grow_to(&mut self, len: usize) {
        if self.cells.len() < len {
            self.cells.resize_with(len, T::default);
        }
    }

    fn destroy_cell(&mut self, index: usize) {
        if let Some(cell) = self.cells.get_mut(index) {
            cell.on_destroy();
        }
    }

    fn reset_cell(&mut self, index: usize) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = T::default();
            flag(&mut self.just_added, index);
            flag(&mut self.changed, index);
        }
    }

    fn take_just_added(&mut self, index: usize) -> bool {
        let was_set = self.just_added.contains(index);
        if was_set {
            self.just_added.set(index, false);
        }
        was_set
    }

    fn is_just_added(&self, index: usize) -> bool {
        self.just_added.contains(index)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Tracked {
        value: i32,
        destroyed: Option<Arc<AtomicUsize>>,
    }

    impl Component for Tracked {
        fn on_destroy(&mut self) {
            if let Some(counter) = &self.destroyed {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_grow_to_backfills_defaults() {
        let mut store = ComponentStore::<Tracked>::with_len(2);
        store.grow_to(5);

        assert_eq!(AnyStore::len(&store), 5);
        assert_eq!(store.get(4).map(|t| t.value), Some(0));
    }

    #[test]
    fn test_reset_cell_replaces_instance_and_flags_it() {
        let mut store = ComponentStore::<Tracked>::with_len(3);
        store.get_mut(1).unwrap().value = 42;

        store.reset_cell(1);

        assert_eq!(store.get(1).unwrap().value, 0);
        assert!(store.is_just_added(1));
        assert!(store.take_just_added(1));
        assert!(!store.take_just_added(1));
    }

    #[test]
    fn test_destroy_cell_runs_hook() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut store = ComponentStore::<Tracked>::with_len(1);
        store.get_mut(0).unwrap().destroyed = Some(Arc::clone(&counter));

        store.destroy_cell(0);
        store.destroy_cell(7);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mutable_access_flags_cells_until_drained() {
        let mut store = ComponentStore::<Tracked>::with_len(4);
        store.get_mut(2).unwrap().value = 5;
        store.cell_mut(3).unwrap().value = 6;
        store.put(0, Tracked::default());

        assert!(store.is_changed(2));
        assert!(!store.is_changed(3));
        assert_eq!(store.drain_changed(), vec![0, 2]);
        assert!(!store.is_changed(2));
        assert!(store.drain_changed().is_empty());
    }
}
