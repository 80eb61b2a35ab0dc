//! Shared data types for the clone studio pipeline: model registry, stage
//! definitions, outcomes, session context and run bookkeeping.

pub mod events;
pub mod models;
pub mod pipeline;
pub mod runs;
pub mod session;
