//! Halving issuance schedule.

/// Reward parameters, all in minor units except `blocks_per_halving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardSchedule {
    pub initial_reward: u128,
    pub blocks_per_halving: u64,
    pub total_supply: u128,
}

impl RewardSchedule {
    pub fn new(initial_reward: u128, blocks_per_halving: u64, total_supply: u128) -> Self {
        Self {
            initial_reward,
            blocks_per_halving,
            total_supply,
        }
    }

    /// Nominal reward at `height`, ignoring the supply cap.
    ///
    /// A zero `blocks_per_halving` never halves.
    pub fn nominal(&self, height: u64) -> u128 {
        let halvings = height.checked_div(self.blocks_per_halving).unwrap_or(0);
        if halvings >= u128::BITS as u64 {
            return 0;
        }
        self.initial_reward >> halvings
    }

    /// Reward for the block at `height` given what has been minted so far.
    ///
    /// Clamped to the remaining supply and zero once it is exhausted.
    pub fn reward(&self, height: u64, total_minted: u128) -> u128 {
        let remaining = self.total_supply.saturating_sub(total_minted);
        if remaining == 0 {
            return 0;
        }
        self.nominal(height).min(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> RewardSchedule {
        RewardSchedule::new(50, 10, 1_000)
    }

    #[test]
    fn halves_every_interval() {
        let s = schedule();
        assert_eq!(s.reward(0, 0), 50);
        assert_eq!(s.reward(9, 0), 50);
        assert_eq!(s.reward(10, 0), 25);
        assert_eq!(s.reward(20, 0), 12);
        assert_eq!(s.reward(30, 0), 6);
    }

    #[test]
    fn non_increasing_in_height() {
        let s = schedule();
        let mut last = u128::MAX;
        for height in 0..2_000 {
            let r = s.reward(height, 0);
            assert!(r <= last);
            last = r;
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn clamped_to_remaining_supply() {
        let s = schedule();
        assert_eq!(s.reward(0, 990), 10);
        assert_eq!(s.reward(0, 1_000), 0);
        assert_eq!(s.reward(0, 5_000), 0);
    }

    #[test]
    fn many_halvings_reach_zero() {
        let s = RewardSchedule::new(u128::MAX, 1, u128::MAX);
        assert_eq!(s.reward(127, 0), 1);
        assert_eq!(s.reward(128, 0), 0);
        assert_eq!(s.reward(u64::MAX, 0), 0);
    }

    #[test]
    fn zero_interval_never_halves() {
        let s = RewardSchedule::new(50, 0, 1_000);
        assert_eq!(s.reward(1_000_000, 0), 50);
    }
}
