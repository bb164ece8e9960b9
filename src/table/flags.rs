//! Flag space
//!
//! 64 opaque bit positions per record, handed out to features such as
//! selection, hitlists and exclusion filters. A bit is either free or owned
//! by exactly one feature. Exclusion bits remove a record from the visible
//! projection; all other bits are plain markers.
//!
//! Structural mutation is single-writer: allocate and free are only called
//! from the owner context.

use std::fmt;

use super::errors::{TableError, TableResult};
use super::record::Record;

/// Number of flag bits per record
pub const FLAG_COUNT: usize = 64;

/// Opaque identity of one allocated flag bit
///
/// Identities are reassigned after [`FlagSpace::free`]; never persist them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlagId(u8);

impl FlagId {
    /// Bit mask of this flag
    pub fn mask(self) -> u64 {
        1u64 << self.0
    }

    /// Raw bit position
    pub fn position(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FlagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocation table over the 64 flag bits of one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSpace {
    allocated: u64,
    exclusion: u64,
}

impl FlagSpace {
    /// Create a flag space with every bit free
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag space whose lowest bit is already owned by a marker feature
    pub fn with_reserved_marker() -> (Self, FlagId) {
        let flag = FlagId(0);
        let space = Self {
            allocated: flag.mask(),
            exclusion: 0,
        };
        (space, flag)
    }

    /// Allocate the lowest free bit
    ///
    /// Returns [`TableError::NoFlagAvailable`] when all bits are owned.
    pub fn allocate(&mut self, use_for_exclusion: bool) -> TableResult<FlagId> {
        let free = !self.allocated;
        if free == 0 {
            return Err(TableError::NoFlagAvailable(FLAG_COUNT));
        }

        let position = free.trailing_zeros() as u8;
        let flag = FlagId(position);
        self.allocated |= flag.mask();
        if use_for_exclusion {
            self.exclusion |= flag.mask();
        }
        Ok(flag)
    }

    /// Release a bit and clear it from every record
    pub fn free(&mut self, flag: FlagId, records: &mut [Record]) -> TableResult<()> {
        if !self.is_allocated(flag) {
            return Err(TableError::FlagNotAllocated(flag));
        }

        let mask = flag.mask();
        for record in records.iter_mut() {
            record.clear_flags(mask);
        }
        self.allocated &= !mask;
        self.exclusion &= !mask;
        Ok(())
    }

    /// True if `flag` is currently owned
    pub fn is_allocated(&self, flag: FlagId) -> bool {
        self.allocated & flag.mask() != 0
    }

    /// True if `flag` affects visibility
    pub fn is_exclusion(&self, flag: FlagId) -> bool {
        self.exclusion & flag.mask() != 0
    }

    /// Mask of every owned bit
    pub fn allocated_mask(&self) -> u64 {
        self.allocated
    }

    /// Mask of the bits that hide records
    pub fn exclusion_mask(&self) -> u64 {
        self.exclusion
    }

    /// Number of free bits
    pub fn free_count(&self) -> usize {
        (!self.allocated).count_ones() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_lowest_free_bit() {
        let mut space = FlagSpace::new();
        let a = space.allocate(false).unwrap();
        let b = space.allocate(true).unwrap();

        assert_ne!(a, b);
        assert!(space.is_allocated(a));
        assert!(!space.is_exclusion(a));
        assert!(space.is_exclusion(b));
        assert_eq!(space.free_count(), FLAG_COUNT - 2);
    }

    #[test]
    fn test_exhaustion() {
        let mut space = FlagSpace::new();
        for _ in 0..FLAG_COUNT {
            space.allocate(false).unwrap();
        }
        assert_eq!(
            space.allocate(false),
            Err(TableError::NoFlagAvailable(FLAG_COUNT))
        );
    }

    #[test]
    fn test_free_clears_records_and_masks() {
        let mut space = FlagSpace::new();
        let flag = space.allocate(true).unwrap();
        let mut records = vec![Record::new(1, 0), Record::new(1, 1)];
        records[1].set_flag(flag, true);

        space.free(flag, &mut records).unwrap();

        assert!(!records[1].is_flag_set(flag));
        assert_eq!(space.allocated_mask(), 0);
        assert_eq!(space.exclusion_mask(), 0);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut space = FlagSpace::new();
        let flag = space.allocate(false).unwrap();
        space.free(flag, &mut []).unwrap();
        assert_eq!(space.free(flag, &mut []), Err(TableError::FlagNotAllocated(flag)));
    }

    #[test]
    fn test_freed_identity_is_reassigned() {
        let mut space = FlagSpace::new();
        let first = space.allocate(false).unwrap();
        space.free(first, &mut []).unwrap();
        let second = space.allocate(true).unwrap();
        assert_eq!(first, second);
        assert!(space.is_exclusion(second));
    }
}
