use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::synth::operator::FmOperator;
use crate::OPERATOR_COUNT;

const _: () = assert!(OPERATOR_COUNT * OPERATOR_COUNT <= 64);

const GRID_MASK: u64 = if OPERATOR_COUNT * OPERATOR_COUNT == 64 {
    u64::MAX
} else {
    (1u64 << (OPERATOR_COUNT * OPERATOR_COUNT)) - 1
};

/// Which operators modulate which, packed one bit per `(src, dst)` pair.
///
/// Bit `src * OPERATOR_COUNT + dst` set means `src` modulates `dst`.
/// Cycles and self-modulation are legal: modulation always reads the
/// previous sample.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RoutingGrid {
    bits: u64,
}

impl RoutingGrid {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self {
            bits: bits & GRID_MASK,
        }
    }

    pub const fn bits(&self) -> u64 {
        self.bits
    }

    #[inline]
    fn bit(src: usize, dst: usize) -> Option<u64> {
        (src < OPERATOR_COUNT && dst < OPERATOR_COUNT).then(|| 1u64 << (src * OPERATOR_COUNT + dst))
    }

    /// Out-of-range indices are ignored.
    pub fn set(&mut self, src: usize, dst: usize, on: bool) {
        if let Some(bit) = Self::bit(src, dst) {
            if on {
                self.bits |= bit;
            } else {
                self.bits &= !bit;
            }
        }
    }

    pub fn with(mut self, src: usize, dst: usize) -> Self {
        self.set(src, dst, true);
        self
    }

    pub fn get(&self, src: usize, dst: usize) -> bool {
        Self::bit(src, dst).is_some_and(|bit| self.bits & bit != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Every `(src, dst)` pair that is set, in bit order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> {
        let mut bits = self.bits;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let i = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some((i / OPERATOR_COUNT, i % OPERATOR_COUNT))
        })
    }

    /// Adds every set source's previous-sample output into its destination's
    /// mod offset. Offsets must have been cleared first.
    #[inline]
    pub fn apply(&self, operators: &mut [FmOperator; OPERATOR_COUNT]) {
        if self.is_empty() {
            return;
        }
        let previous: [f32; OPERATOR_COUNT] = std::array::from_fn(|i| operators[i].last_mono());
        for (src, dst) in self.iter() {
            operators[dst].add_mod_from(previous[src]);
        }
    }
}

/// The routing grid shared between control and audio threads.
#[derive(Debug, Default)]
pub struct SharedRouting {
    bits: AtomicU64,
}

impl SharedRouting {
    pub fn new(grid: RoutingGrid) -> Self {
        Self {
            bits: AtomicU64::new(grid.bits()),
        }
    }

    pub fn load(&self) -> RoutingGrid {
        RoutingGrid::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn store(&self, grid: RoutingGrid) {
        self.bits.store(grid.bits(), Ordering::Release);
    }

    pub fn set(&self, src: usize, dst: usize, on: bool) {
        if let Some(bit) = RoutingGrid::bit(src, dst) {
            if on {
                self.bits.fetch_or(bit, Ordering::AcqRel);
            } else {
                self.bits.fetch_and(!bit, Ordering::AcqRel);
            }
        }
    }
}
