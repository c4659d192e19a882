//! Command surfaces built on the core: the role gate, the aggregator and the
//! producer commands.

pub mod aggregate;
pub mod enforce;
pub mod log;
