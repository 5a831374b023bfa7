//! Block subsidy schedule.
//!
//! Every block after genesis mints a subsidy of the native asset through its
//! coinbase. The subsidy starts at [`INITIAL_SUBSIDY`] and halves every
//! [`SUBSIDY_REDUCTION_INTERVAL`] blocks:
//!
//! - heights 1 to 839,999: 624,000,000,000 units
//! - heights 840,000 to 1,679,999: 312,000,000,000 units
//! - and so on until the shifted value truncates to zero.
//!
//! The genesis block is not governed by the schedule. Its issuance comes from
//! [`GenesisParams`](crate::genesis::GenesisParams).

use serde::{Deserialize, Serialize};

use crate::constants::{INITIAL_SUBSIDY, SUBSIDY_REDUCTION_INTERVAL};

/// Height-indexed subsidy schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsidySchedule {
    pub initial: u64,
    pub reduction_interval: u64,
}

impl Default for SubsidySchedule {
    fn default() -> Self {
        Self {
            initial: INITIAL_SUBSIDY,
            reduction_interval: SUBSIDY_REDUCTION_INTERVAL,
        }
    }
}

impl SubsidySchedule {
    /// Native units the coinbase at `height` must mint.
    ///
    /// Height 0 returns 0: the genesis coinbase is checked against the
    /// genesis issuance instead.
    pub fn subsidy(&self, height: u64) -> u64 {
        if height == 0 || self.reduction_interval == 0 {
            return 0;
        }
        let epoch = height / self.reduction_interval;
        if epoch >= 64 {
            return 0;
        }
        self.initial >> epoch
    }

    /// Height of the next reduction after `height`, or `None` once the
    /// subsidy is exhausted.
    pub fn next_reduction_height(&self, height: u64) -> Option<u64> {
        if self.reduction_interval == 0 {
            return None;
        }
        let next = (height / self.reduction_interval + 1).checked_mul(self.reduction_interval)?;
        (self.subsidy(height.max(1)) > 0).then_some(next)
    }

    /// Total minted by blocks `1..=height`, saturating at `u64::MAX`.
    pub fn cumulative(&self, height: u64) -> u64 {
        if self.reduction_interval == 0 {
            return 0;
        }
        let mut total: u64 = 0;
        let mut start = 1u64;
        while start <= height {
            let per_block = self.subsidy(start);
            if per_block == 0 {
                break;
            }
            let epoch_end = (start / self.reduction_interval + 1)
                .saturating_mul(self.reduction_interval)
                .saturating_sub(1);
            let end = epoch_end.min(height);
            let blocks = end - start + 1;
            total = total.saturating_add(per_block.saturating_mul(blocks));
            match end.checked_add(1) {
                Some(next) => start = next,
                None => break,
            }
        }
        total
    }
}
