//! State safety: analytic unsafe region, value-function oracle and initial-state sampling.

pub mod oracle;
pub mod region;
pub mod sampler;

pub use oracle::{Certified, SafetyOracle, StateClassifier};
pub use region::UnsafeRegion;
pub use sampler::{DEFAULT_RETRY_BUDGET, InitMode, InitialStateSampler, SampleOutcome, SamplerConfig};
