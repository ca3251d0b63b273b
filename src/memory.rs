use std::rc::Rc;

use fxhash::FxHashMap;

use crate::error::{Access, MachineError};

/// Number of addressable words.
pub const MEMORY_SIZE: usize = 4096;

/// Read-only source of words that a [`Memory`] is loaded from.
///
/// Implemented by plain word buffers and by assembled programs, so either can be executed.
pub trait Backing {
    /// Number of words present.
    fn len(&self) -> usize;

    /// Word at `addr`, or `None` past the end.
    fn word(&self, addr: usize) -> Option<u16>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backing for [u16] {
    fn len(&self) -> usize {
        <[u16]>::len(self)
    }

    fn word(&self, addr: usize) -> Option<u16> {
        self.get(addr).copied()
    }
}

impl Backing for Vec<u16> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn word(&self, addr: usize) -> Option<u16> {
        self.as_slice().word(addr)
    }
}

impl<B: Backing + ?Sized> Backing for &B {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn word(&self, addr: usize) -> Option<u16> {
        (**self).word(addr)
    }
}

impl<B: Backing + ?Sized> Backing for Rc<B> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn word(&self, addr: usize) -> Option<u16> {
        (**self).word(addr)
    }
}

/// Machine memory: an untouched base plus an overlay of every write made since the last reset.
///
/// Addresses past the end of the base read as zero until written.
#[derive(Debug)]
pub struct Memory<B> {
    /// Must not be mutated.
    base: B,
    overlay: FxHashMap<usize, u16>,
}

impl<B: Backing> Memory<B> {
    pub fn new(base: B) -> Result<Self, MachineError> {
        if base.len() > MEMORY_SIZE {
            return Err(MachineError::AddressOutOfBounds {
                addr: base.len() as i64,
                access: Access::Load,
            });
        }
        Ok(Memory {
            base,
            overlay: FxHashMap::default(),
        })
    }

    pub fn read(&self, addr: usize) -> Result<u16, MachineError> {
        if addr >= MEMORY_SIZE {
            return Err(MachineError::AddressOutOfBounds {
                addr: addr as i64,
                access: Access::Read,
            });
        }
        let value = match self.overlay.get(&addr) {
            Some(value) => *value,
            None => self.base.word(addr).unwrap_or(0),
        };
        Ok(value)
    }

    /// Store `value` at `addr`.
    ///
    /// Negative values down to `-32768` are stored in two's complement.
    pub fn write(&mut self, addr: usize, value: i64) -> Result<(), MachineError> {
        if addr >= MEMORY_SIZE {
            return Err(MachineError::AddressOutOfBounds {
                addr: addr as i64,
                access: Access::Write,
            });
        }
        if !(i16::MIN as i64..=u16::MAX as i64).contains(&value) {
            return Err(MachineError::NumberOverflow { addr, value });
        }
        self.overlay.insert(addr, value as u16);
        Ok(())
    }

    /// Forget every write, leaving the base as loaded.
    pub fn reset(&mut self) {
        self.overlay.clear();
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    /// Amount of cells written since the last reset.
    pub fn dirty_len(&self) -> usize {
        self.overlay.len()
    }
}
