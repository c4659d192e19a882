//! Core of the audit trail: record model, log layout, writer and shared
//! primitives. Command surfaces live in `plugins`.

pub mod config;
pub mod error;
pub mod event;
pub mod output;
pub mod store;
pub mod time;
pub mod writer;
