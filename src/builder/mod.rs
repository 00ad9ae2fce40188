//! Transaction Builder
//!
//! - `pipeline`: [`StampEngine`] running a build from payload to PSBT
//! - `assembler`: output finalisation, funding proofs and PSBT assembly

pub mod assembler;
pub mod pipeline;

pub use assembler::{assemble, finalise_outputs, AssembledTransaction};
pub use pipeline::{BuildOptions, BuildRequest, BuildResult, PayloadPlan, StampEngine};
