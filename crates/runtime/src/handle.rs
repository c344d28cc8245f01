// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Generational handles.
//!
//! A handle is a slot index plus the generation the slot had when the
//! handle was issued. Removing a value bumps the slot's generation, so
//! every outstanding handle to it goes stale instead of aliasing whatever
//! reuses the slot. Handles convert to and from a single non-zero `u64`
//! for callers that need a plain integer.

use std::fmt;
use std::num::NonZeroU32;

/// Untyped handle bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle {
    index: u32,
    generation: NonZeroU32,
}

impl RawHandle {
    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation.get()) << 32) | u64::from(self.index)
    }

    /// Rebuilds a handle; `None` for bits no registry can have issued.
    pub fn from_bits(bits: u64) -> Option<Self> {
        let generation = NonZeroU32::new((bits >> 32) as u32)?;
        Some(Self {
            index: bits as u32,
            generation,
        })
    }
}

struct Slot<T> {
    generation: NonZeroU32,
    value: Option<T>,
}

/// Slot map keyed by [`RawHandle`].
pub struct HandleRegistry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> RawHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return RawHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: NonZeroU32::MIN,
            value: Some(value),
        });
        RawHandle {
            index,
            generation: NonZeroU32::MIN,
        }
    }

    fn slot(&self, handle: RawHandle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
    }

    pub fn get(&self, handle: RawHandle) -> Option<&T> {
        self.slot(handle)?.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: RawHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)?
            .value
            .as_mut()
    }

    /// Removes the value and invalidates every handle to it.
    pub fn remove(&mut self, handle: RawHandle) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.checked_add(1).unwrap_or(NonZeroU32::MIN);
        self.free.push(handle.index);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live values with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (RawHandle, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value.as_ref().map(|v| {
                (
                    RawHandle {
                        index: i as u32,
                        generation: s.generation,
                    },
                    v,
                )
            })
        })
    }
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) RawHandle);

        impl $name {
            pub fn to_bits(self) -> u64 {
                self.0.to_bits()
            }

            pub fn from_bits(bits: u64) -> Option<Self> {
                RawHandle::from_bits(bits).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}.{}"), self.0.index, self.0.generation)
            }
        }
    };
}

typed_handle!(
    /// Handle to a loaded model.
    ModelHandle,
    "model"
);
typed_handle!(
    /// Handle to an executor.
    ExecutorHandle,
    "executor"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_handle_after_remove() {
        let mut reg = HandleRegistry::new();
        let a = reg.insert("a");
        assert_eq!(reg.remove(a), Some("a"));
        let b = reg.insert("b");
        assert_eq!(a.index, b.index);
        assert_ne!(a, b);
        assert_eq!(reg.get(a), None);
        assert_eq!(reg.get(b), Some(&"b"));
        assert_eq!(reg.remove(a), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_bits_round_trip() {
        let mut reg = HandleRegistry::new();
        reg.insert(1);
        let h = reg.insert(2);
        let bits = h.to_bits();
        assert_ne!(bits, 0);
        assert_eq!(RawHandle::from_bits(bits), Some(h));
        assert_eq!(RawHandle::from_bits(0), None);
        assert_eq!(RawHandle::from_bits(7), None);
    }

    #[test]
    fn test_generation_wraps_to_one() {
        let mut reg = HandleRegistry::new();
        let h = reg.insert(());
        reg.slots[0].generation = NonZeroU32::MAX;
        let h = RawHandle {
            generation: NonZeroU32::MAX,
            ..h
        };
        reg.remove(h);
        assert_eq!(reg.slots[0].generation, NonZeroU32::MIN);
    }

    #[test]
    fn test_typed_display() {
        let mut reg = HandleRegistry::new();
        let h = ModelHandle(reg.insert(()));
        assert_eq!(h.to_string(), "model#0.1");
        assert_eq!(ModelHandle::from_bits(h.to_bits()), Some(h));
    }

    #[test]
    fn test_iter_skips_removed() {
        let mut reg = HandleRegistry::new();
        let a = reg.insert(10);
        reg.insert(20);
        reg.remove(a);
        let live: Vec<_> = reg.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec![20]);
    }
}
