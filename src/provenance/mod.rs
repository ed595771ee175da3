//! Provenance: value hashing and the append-only run event log.

pub mod eventlog;
pub mod hasher;
