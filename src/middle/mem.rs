//! The segmented virtual address scheme.
//!
//! An address is a plain integer that encodes (segment, type, index) through
//! base offsets, so the VM can read the segment and type of any operand
//! without a side table:
//!
//! ```txt
//!   segment bases          type offsets within a segment
//!   global = 10000         int    = 0
//!   local  = 20000         float  = 2000
//!   temp   = 30000         string = 4000
//!   const  = 40000
//! ```
//!
//! Each (segment, type) partition holds [BLOCK_SIZE] entries.  The manager
//! hands out consecutive indices per partition; `local` and `temp` are
//! snapshotted and reset at every function end so each function gets its own
//! 0-based indices out of a single set of counters.

use derive_more::Display;

use crate::common::Type;
use crate::error::CompileError;

/// A virtual address.
pub type Addr = usize;

/// Entries per (segment, type) partition.
pub const BLOCK_SIZE: usize = 2000;

/// The four address segments.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum Segment {
    #[display("global")]
    Global,
    #[display("local")]
    Local,
    #[display("temp")]
    Temp,
    #[display("const")]
    Const,
}

impl Segment {
    fn base(self) -> Addr {
        match self {
            Segment::Global => 10000,
            Segment::Local => 20000,
            Segment::Temp => 30000,
            Segment::Const => 40000,
        }
    }

    fn slot(self) -> usize {
        match self {
            Segment::Global => 0,
            Segment::Local => 1,
            Segment::Temp => 2,
            Segment::Const => 3,
        }
    }
}

fn type_offset(ty: Type) -> Addr {
    match ty {
        Type::Int => 0,
        Type::Float => BLOCK_SIZE,
        Type::Str => 2 * BLOCK_SIZE,
    }
}

/// Per-type allocation counts for one segment.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Counters {
    pub ints: usize,
    pub floats: usize,
    pub strings: usize,
}

impl Counters {
    fn of(&mut self, ty: Type) -> &mut usize {
        match ty {
            Type::Int => &mut self.ints,
            Type::Float => &mut self.floats,
            Type::Str => &mut self.strings,
        }
    }
}

/// Allocator for the segmented address space.
#[derive(Default)]
pub struct MemoryManager {
    counters: [Counters; 4],
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base address of a (segment, type) partition.
    pub fn base(segment: Segment, ty: Type) -> Addr {
        segment.base() + type_offset(ty)
    }

    /// Allocate the next address in the given partition.
    pub fn new_addr(&mut self, segment: Segment, ty: Type) -> Result<Addr, CompileError> {
        let counter = self.counters[segment.slot()].of(ty);
        if *counter >= BLOCK_SIZE {
            return Err(CompileError::OutOfMemory { segment, ty });
        }
        let idx = *counter;
        *counter += 1;
        Ok(Self::base(segment, ty) + idx)
    }

    /// Recover (segment, type, index) from an address.  Returns `None` for
    /// addresses outside the defined range.
    pub fn decode(addr: Addr) -> Option<(Segment, Type, usize)> {
        let segment = match addr {
            10000..=15999 => Segment::Global,
            20000..=25999 => Segment::Local,
            30000..=35999 => Segment::Temp,
            40000..=45999 => Segment::Const,
            _ => return None,
        };
        let offset = addr - segment.base();
        let ty = match offset / BLOCK_SIZE {
            0 => Type::Int,
            1 => Type::Float,
            _ => Type::Str,
        };
        Some((segment, ty, offset % BLOCK_SIZE))
    }

    /// Current per-type counters of a segment.
    pub fn snapshot(&self, segment: Segment) -> Counters {
        self.counters[segment.slot()]
    }

    /// Set a segment's counters back to zero.
    pub fn reset(&mut self, segment: Segment) {
        self.counters[segment.slot()] = Counters::default();
    }
}
