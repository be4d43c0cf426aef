//! Receive-side bit error injection.
//!
//! In emulation mode every received payload is corrupted before FEC
//! correction: one bit with probability 0.75, otherwise two. Each flip picks
//! a uniformly random byte and a uniformly random bit within it, so two
//! flips may land on the same bit and cancel out.

use crate::random::RandomSource;

/// Probability that a payload receives exactly one bit error.
pub const SINGLE_ERROR_PROBABILITY: f64 = 0.75;

/// Flips random payload bits.
pub struct FaultInjector {
    rng: Box<dyn RandomSource>,
    single_error_probability: f64,
    injected: u64,
}

impl FaultInjector {
    pub fn new(rng: Box<dyn RandomSource>) -> Self {
        Self::with_probability(rng, SINGLE_ERROR_PROBABILITY)
    }

    /// Injector with a custom single-error probability.
    pub fn with_probability(rng: Box<dyn RandomSource>, single_error_probability: f64) -> Self {
        Self {
            rng,
            single_error_probability,
            injected: 0,
        }
    }

    /// Corrupt `payload` in place.
    ///
    /// # Returns
    /// Number of bit flips applied (0 for an empty payload, else 1 or 2).
    pub fn inject(&mut self, payload: &mut [u8]) -> usize {
        if payload.is_empty() {
            return 0;
        }

        let count = if self.rng.next_uniform() < self.single_error_probability {
            1
        } else {
            2
        };

        for _ in 0..count {
            let byte = self.rng.next_in_range(0, payload.len() as i64 - 1) as usize;
            let bit = self.rng.next_in_range(0, 7) as u32;
            payload[byte] ^= 1u8 << bit;
        }

        self.injected += count as u64;
        count
    }

    /// Total bit flips applied so far.
    pub fn injected(&self) -> u64 {
        self.injected
    }
}

impl std::fmt::Debug for FaultInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInjector")
            .field("single_error_probability", &self.single_error_probability)
            .field("injected", &self.injected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hamming::{calculate_control_bits, correct, Correction};
    use crate::random::{ScriptedRandom, SeededRandom};

    #[test]
    fn test_empty_payload_untouched() {
        let mut injector = FaultInjector::new(Box::new(SeededRandom::new(1)));
        assert_eq!(injector.inject(&mut []), 0);
        assert_eq!(injector.injected(), 0);
    }

    #[test]
    fn test_single_flip() {
        // uniform 0.1 -> one error; byte 1, bit 0
        let rng = ScriptedRandom::new([0.1], [1, 0]);
        let mut injector = FaultInjector::new(Box::new(rng));

        let mut payload = vec![0x00, 0x00, 0x00];
        assert_eq!(injector.inject(&mut payload), 1);
        assert_eq!(payload, vec![0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_double_flip() {
        // uniform 0.9 -> two errors; (0, 7) then (2, 3)
        let rng = ScriptedRandom::new([0.9], [0, 7, 2, 3]);
        let mut injector = FaultInjector::new(Box::new(rng));

        let mut payload = vec![0x00, 0x00, 0x00];
        assert_eq!(injector.inject(&mut payload), 2);
        assert_eq!(payload, vec![0x80, 0x00, 0x08]);
        assert_eq!(injector.injected(), 2);
    }

    #[test]
    fn test_distribution() {
        let mut injector = FaultInjector::new(Box::new(SeededRandom::new(42)));
        let mut singles = 0;
        for _ in 0..1000 {
            let mut payload = vec![0u8; 16];
            if injector.inject(&mut payload) == 1 {
                singles += 1;
            }
        }
        // Expect ~750
        assert!((650..=850).contains(&singles), "singles = {singles}");
    }

    #[test]
    fn test_single_errors_always_corrected() {
        let mut injector = FaultInjector::with_probability(Box::new(SeededRandom::new(9)), 1.0);
        let original = b"single-bit faults are always repaired".to_vec();
        let fcs = calculate_control_bits(&original);

        for _ in 0..200 {
            let mut payload = original.clone();
            injector.inject(&mut payload);
            let outcome = correct(&mut payload, &fcs).unwrap();
            assert!(matches!(outcome, Correction::Corrected { .. }));
            assert_eq!(payload, original);
        }
    }
}
