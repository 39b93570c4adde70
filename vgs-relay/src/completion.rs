//! Per-frame count of senders that reported frame-complete.

use vgs_core::StatusCode;

use crate::error::RelayError;

/// Stays within `0..=senders`; the report that reaches `senders` closes the
/// round and resets the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionCounter {
    count: u32,
    senders: u32,
    rounds: u64,
}

impl CompletionCounter {
    pub fn new(senders: u32) -> Self {
        Self {
            count: 0,
            senders,
            rounds: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn senders(&self) -> u32 {
        self.senders
    }

    /// Completed rounds so far.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Whether the next report will close the round.
    pub fn next_completes(&self) -> bool {
        self.count + 1 == self.senders
    }

    /// Record one report. `Ok(true)` when it closed the round.
    pub fn record(&mut self) -> Result<bool, RelayError> {
        if self.count >= self.senders {
            return Err(RelayError::status(
                StatusCode::CompletionOverflow,
                format!("{} reports for {} senders", self.count + 1, self.senders),
            ));
        }
        self.count += 1;
        if self.count == self.senders {
            self.count = 0;
            self.rounds += 1;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_closes_on_the_nth_report() {
        let mut counter = CompletionCounter::new(3);
        assert!(!counter.record().unwrap());
        assert!(!counter.record().unwrap());
        assert_eq!(counter.count(), 2);
        assert!(counter.next_completes());
        assert!(counter.record().unwrap());
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.rounds(), 1);
    }

    #[test]
    fn single_sender_completes_every_report() {
        let mut counter = CompletionCounter::new(1);
        for _ in 0..4 {
            assert!(counter.record().unwrap());
        }
        assert_eq!(counter.rounds(), 4);
    }

    #[test]
    fn zero_senders_overflow() {
        let mut counter = CompletionCounter::new(0);
        let err = counter.record().unwrap_err();
        assert_eq!(err.code(), StatusCode::CompletionOverflow);
    }
}
