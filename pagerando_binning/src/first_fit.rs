//! Greedy first-fit bin packer.
//!
//! For every size request, picks the bin with the smallest remaining free
//! space that still accommodates it. If no such bin exists a new one is
//! opened; requests at or above the bin size force the expansion of their
//! own fresh bin rather than being rejected.

use pagerando_mir::size::MIN_FN_SIZE;
use std::collections::BTreeSet;

/// A bin id. Bin 0 is reserved for "unbinned"; the first real bin is 1.
pub type BinId = u32;

/// First-fit packer state: an ordered multimap from remaining free space
/// to bin id.
pub struct FirstFit {
    bin_size: u32,
    bins: BTreeSet<(u32, BinId)>,
    bin_count: BinId,
}

impl FirstFit {
    pub fn new(bin_size: u32) -> Self {
        debug_assert!(bin_size.is_power_of_two(), "bin size must be a page size");
        Self {
            bin_size,
            bins: BTreeSet::new(),
            bin_count: 1,
        }
    }

    /// Assign a size request to a bin and return the bin id.
    pub fn assign(&mut self, fn_size: u32) -> BinId {
        let (free_space, bin) = match self.bins.range((fn_size, 0)..).next().copied() {
            Some((free, bin)) => {
                self.bins.remove(&(free, bin));
                (free - fn_size, bin)
            }
            None => {
                // No bin with enough free space.
                let bin = self.bin_count;
                self.bin_count += 1;
                let rem = fn_size % self.bin_size;
                let free = if rem == 0 { 0 } else { self.bin_size - rem };
                (free, bin)
            }
        };

        if free_space >= MIN_FN_SIZE {
            self.bins.insert((free_space, bin));
        }

        bin
    }
}
