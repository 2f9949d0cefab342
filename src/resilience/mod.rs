//! Resilience helpers for network and storage calls.

pub mod retry;
