//! Generation-checked handles to backend-owned trait instances.
//!
//! A handle is an `(index, generation)` pair into a [`HandleTable`]. When a
//! slot is released its generation advances, so an old handle to a reused
//! slot is reported as stale instead of silently aliasing the new occupant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle naming one trait instance inside a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SinkHandle {
    index: u32,
    generation: u32,
}

impl SinkHandle {
    /// Builds a handle from raw parts. Backends that keep their own tables
    /// use this; callers should treat handles as opaque.
    #[must_use]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena of values addressed by [`SinkHandle`]s.
///
/// Released indices are reused; every release bumps the slot's generation.
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Stores a value and returns its handle.
    pub fn insert(&mut self, value: T) -> SinkHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return SinkHandle::from_parts(index, slot.generation);
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        SinkHandle::from_parts(index, 1)
    }

    pub fn get(&self, handle: SinkHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: SinkHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, handle: SinkHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Releases the value behind `handle`. Returns `None` for stale handles.
    pub fn remove(&mut self, handle: SinkHandle) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Releases every value.
    pub fn drain(&mut self) -> Vec<(SinkHandle, T)> {
        let handles = self.handles();
        handles
            .into_iter()
            .filter_map(|h| self.remove(h).map(|v| (h, v)))
            .collect()
    }

    /// Handles of all live values.
    pub fn handles(&self) -> Vec<SinkHandle> {
        self.iter().map(|(h, _)| h).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SinkHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (SinkHandle::from_parts(i as u32, slot.generation), v))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SinkHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|v| (SinkHandle::from_parts(i as u32, generation), v))
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
