//! Simulation utilities for cluster-level tests

pub mod fake_cluster;

pub use fake_cluster::*;
