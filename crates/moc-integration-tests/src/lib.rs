//! Integration test crate for the MOC oracle network.
//!
//! This crate has no library code. It only contains integration tests
//! that drive the registry, staking pool and round managers together
//! through `OracleNetwork`.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p moc-integration-tests
//! ```
