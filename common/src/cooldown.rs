/// Global gate that serializes dispatches from every button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownTimer {
    cooldown_ms: u64,
    last_action_ms: Option<u64>,
}

impl CooldownTimer {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            last_action_ms: None,
        }
    }

    pub fn last_action_ms(&self) -> Option<u64> {
        self.last_action_ms
    }

    pub fn is_clear(&self, now_ms: u64) -> bool {
        match self.last_action_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.cooldown_ms,
            None => true,
        }
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        match self.last_action_ms {
            Some(last) => self
                .cooldown_ms
                .saturating_sub(now_ms.saturating_sub(last)),
            None => 0,
        }
    }

    pub fn mark(&mut self, now_ms: u64) {
        self.last_action_ms = Some(now_ms);
    }

    /// Claims the gate if it is clear. Returns whether the caller may act.
    pub fn try_acquire(&mut self, now_ms: u64) -> bool {
        if self.is_clear(now_ms) {
            self.mark(now_ms);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_before_first_action() {
        let gate = CooldownTimer::new(5_000);

        assert!(gate.is_clear(0));
        assert_eq!(gate.remaining_ms(0), 0);
    }

    #[test]
    fn blocks_until_cooldown_elapses() {
        let mut gate = CooldownTimer::new(5_000);
        assert!(gate.try_acquire(10_000));

        assert!(!gate.try_acquire(10_001));
        assert!(!gate.try_acquire(14_999));
        assert_eq!(gate.remaining_ms(14_000), 1_000);
        assert_eq!(gate.last_action_ms(), Some(10_000));

        assert!(gate.try_acquire(15_000));
        assert_eq!(gate.last_action_ms(), Some(15_000));
    }
}
