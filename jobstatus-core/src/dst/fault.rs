//! Fault Injection
//!
//! Faults are registered with a probability and consulted at the points where
//! a real storage engine could fail.

use super::rng::DeterministicRng;

/// Where in a storage round-trip a fault strikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    /// Connection attempt refused during open
    OpenFail,
    /// Connection lost mid-operation (SQLSTATE 08006)
    ConnectionDrop,
    /// Write rejected by storage for an unclassified reason (SQLSTATE XX000)
    WriteFail,
    /// A stored row comes back with a NULL in a non-null column
    CorruptRow,
}

/// A fault and how often it fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultConfig {
    /// Fault to inject
    pub fault_type: FaultType,
    /// Chance per consultation, in `[0, 1]`
    pub probability: f64,
}

impl FaultConfig {
    /// # Panics
    /// Panics if `probability` is outside `[0, 1]`.
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability {probability} outside [0, 1]"
        );
        Self {
            fault_type,
            probability,
        }
    }

    /// Fires every time.
    #[must_use]
    pub fn always(fault_type: FaultType) -> Self {
        Self::new(fault_type, 1.0)
    }
}

/// Decides, deterministically, whether a fault fires.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: DeterministicRng,
    faults: Vec<FaultConfig>,
    injected_count: u64,
}

impl FaultInjector {
    /// An injector with no faults registered, drawing from `rng`.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            faults: Vec::new(),
            injected_count: 0,
        }
    }

    /// An injector that never fires.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(DeterministicRng::new(0))
    }

    /// Register a fault.
    #[must_use]
    pub fn with_fault(mut self, fault: FaultConfig) -> Self {
        self.faults.push(fault);
        self
    }

    /// Roll for every registered fault of `fault_type`.
    pub fn should_inject(&mut self, fault_type: FaultType) -> bool {
        let probabilities: Vec<f64> = self
            .faults
            .iter()
            .filter(|f| f.fault_type == fault_type)
            .map(|f| f.probability)
            .collect();

        let fired = probabilities.into_iter().any(|p| self.rng.chance(p));
        if fired {
            self.injected_count += 1;
            tracing::debug!(?fault_type, seed = self.rng.seed(), "fault injected");
        }
        fired
    }

    /// Faults fired so far.
    #[must_use]
    pub fn injected_count(&self) -> u64 {
        self.injected_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_fires() {
        let mut injector = FaultInjector::disabled();
        assert!(!injector.should_inject(FaultType::ConnectionDrop));
        assert_eq!(injector.injected_count(), 0);
    }

    #[test]
    fn test_always_fires_only_for_its_type() {
        let mut injector = FaultInjector::new(DeterministicRng::new(3))
            .with_fault(FaultConfig::always(FaultType::WriteFail));
        assert!(injector.should_inject(FaultType::WriteFail));
        assert!(!injector.should_inject(FaultType::CorruptRow));
        assert_eq!(injector.injected_count(), 1);
    }

    #[test]
    fn test_same_seed_same_decisions() {
        let run = |seed| {
            let mut injector = FaultInjector::new(DeterministicRng::new(seed))
                .with_fault(FaultConfig::new(FaultType::ConnectionDrop, 0.5));
            (0..64)
                .map(|_| injector.should_inject(FaultType::ConnectionDrop))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(99), run(99));
    }
}
