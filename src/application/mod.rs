//! Application layer: verification, the polling job and its scheduler, and payment link
//! generation.

pub mod cadence;
pub mod job;
pub mod links;
pub mod scheduler;
pub mod verifier;
