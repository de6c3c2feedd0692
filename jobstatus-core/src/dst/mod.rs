//! DST - Deterministic Simulation Testing
//!
//! Seeded fault injection for the simulation storage backend.
//!
//! ```rust
//! use jobstatus_core::dst::{DeterministicRng, FaultConfig, FaultInjector, FaultType};
//!
//! let mut faults = FaultInjector::new(DeterministicRng::new(42))
//!     .with_fault(FaultConfig::new(FaultType::ConnectionDrop, 0.1));
//! let _dropped = faults.should_inject(FaultType::ConnectionDrop);
//! ```
//!
//! Run with explicit seed for reproducibility:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

mod fault;
mod rng;

pub use fault::{FaultConfig, FaultInjector, FaultType};
pub use rng::DeterministicRng;
