//! Proof-of-work target and retargeting.
//!
//! # Target semantics
//!
//! `bits` in [`BlockHeader`] is a u64 target where **higher = easier**. The
//! default work check reads the first 8 bytes of the header hash as a
//! little-endian u64 and requires it to be `<= bits`, so `u64::MAX` accepts
//! every header.
//!
//! # Retargeting
//!
//! Every block after height 1 retargets from a rolling window of ancestor
//! timestamps. Actual elapsed time is compared with the expected time for the
//! window and the parent's bits are scaled proportionally, with the elapsed
//! time clamped so that one step never changes the target by more than
//! [`MAX_ADJUSTMENT_FACTOR`]. While the chain is shorter than the window, all
//! available ancestors are used.

use crate::traits::ProofOfWork;
use crate::types::{BlockHeader, Hash256};

/// Largest factor by which one retarget can move the target.
pub const MAX_ADJUSTMENT_FACTOR: u64 = 4;

/// Hardest possible target.
pub const MIN_BITS: u64 = 1;

/// Easiest possible target; accepts any hash.
pub const MAX_BITS: u64 = u64::MAX;

/// Scale `current` by the time taken over `timestamps` (oldest first).
///
/// Fewer than two timestamps leaves the target unchanged.
pub fn next_bits(timestamps: &[u64], current: u64, target_block_time: u64) -> u64 {
    let (Some(first), Some(last)) = (timestamps.first(), timestamps.last()) else {
        return current;
    };
    let intervals = (timestamps.len() - 1) as u64;
    let expected = intervals.saturating_mul(target_block_time);
    if expected == 0 {
        return current;
    }

    let actual = last.saturating_sub(*first);
    let clamped = actual.clamp(expected / MAX_ADJUSTMENT_FACTOR, expected.saturating_mul(MAX_ADJUSTMENT_FACTOR));

    let scaled = (current as u128).saturating_mul(clamped as u128) / (expected as u128);
    (scaled.min(MAX_BITS as u128) as u64).max(MIN_BITS)
}

/// Number of ancestor timestamps the retarget for `height` consumes.
///
/// These are the timestamps at heights `height - n .. height`.
pub fn window_len(height: u64, window: u64) -> u64 {
    if height <= 1 {
        return 0;
    }
    height.min(window.saturating_add(1))
}

/// Bits a block at `height` must carry.
///
/// `ancestor_timestamps` holds the [`window_len`] timestamps ending at the
/// parent, oldest first. Heights 0 and 1 use `initial_bits`.
pub fn bits_for_height(
    height: u64,
    parent_bits: u64,
    initial_bits: u64,
    ancestor_timestamps: &[u64],
    target_block_time: u64,
) -> u64 {
    if height <= 1 {
        return initial_bits;
    }
    next_bits(ancestor_timestamps, parent_bits, target_block_time)
}

/// Whether `hash` satisfies `bits`.
pub fn hash_meets_bits(hash: &Hash256, bits: u64) -> bool {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.0[..8]);
    u64::from_le_bytes(prefix) <= bits
}

/// Work check over the double SHA-256 header hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256dWork;

impl ProofOfWork for Sha256dWork {
    fn check(&self, header: &BlockHeader) -> bool {
        hash_meets_bits(&header.hash(), header.bits)
    }
}

/// Search nonces `0..=max_nonce` for one that satisfies `work`.
///
/// Leaves the winning nonce in `header` and returns `true`, or returns
/// `false` with the last nonce tried.
pub fn solve(header: &mut BlockHeader, work: &dyn ProofOfWork, max_nonce: u64) -> bool {
    for nonce in 0..=max_nonce {
        header.nonce = nonce;
        if work.check(header) {
            return true;
        }
    }
    false
}
