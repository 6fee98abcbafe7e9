//! The transcription pipeline, one module per pass
//!
//! Every pass is a pure function of its inputs and the configuration and
//! returns a new value; nothing is shared or mutated between passes.

pub mod pass_0;
pub mod pass_1;
pub mod pass_2;
pub mod pass_3;
pub mod pass_4;
pub mod pass_5;
