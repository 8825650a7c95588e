///
/// Handle registry.
///
/// Native resources never cross the boundary as pointers. Each one lives in a
/// slot of a `Registry`, and callers hold a `Handle`: the slot index plus the
/// slot's generation at registration time. Finalizing a slot bumps its
/// generation, so a handle that outlived its resource (or a forged integer)
/// fails to resolve instead of reaching freed memory, even after the slot has
/// been reused.
///
/// On the host side a handle is a positive i64: generation in the high
/// 32 bits, slot index in the low 32 bits.
///

use crate::error::{Error, HandleKind, Result};

/// Highest generation a slot is issued with; past it the slot wraps to 1.
const MAX_GENERATION: u32 = i32::MAX as u32 - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn to_raw(self) -> i64 {
        ((self.generation as i64) << 32) | self.index as i64
    }

    /// Any i64 is accepted; values never issued simply fail to resolve.
    pub fn from_raw(raw: i64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub struct Registry<T> {
    kind: HandleKind,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Registry<T> {
    pub const fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn register(&mut self, value: T) -> Result<Handle> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| Error::RegistryFull { kind: self.kind })?;
                self.slots.push(Slot { generation: 1, value: None });
                index
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.live += 1;
        Ok(Handle { index, generation: slot.generation })
    }

    pub fn resolve(&self, handle: Handle) -> Result<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
            .ok_or_else(|| self.invalid(handle))
    }

    /// Remove the resource behind `handle`, invalidating the handle.
    /// Dropping the returned value runs the resource's destructor.
    pub fn finalize(&mut self, handle: Handle) -> Result<T> {
        let invalid = self.invalid(handle);
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(invalid)?;
        let value = slot.value.take().ok_or(Error::InvalidHandle {
            kind: self.kind,
            handle: handle.to_raw(),
        })?;
        slot.generation = if slot.generation >= MAX_GENERATION {
            1
        } else {
            slot.generation + 1
        };
        self.free.push(handle.index);
        self.live -= 1;
        Ok(value)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.resolve(handle).is_ok()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn invalid(&self, handle: Handle) -> Error {
        Error::InvalidHandle {
            kind: self.kind,
            handle: handle.to_raw(),
        }
    }
}
