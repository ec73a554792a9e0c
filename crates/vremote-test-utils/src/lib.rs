//! vremote-test-utils: Test infrastructure for vremote.
//!
//! Provides:
//! - MockDaemon: scripted responder speaking the daemon's wire protocol
//! - TestPki: throwaway certificate authority and leaf certificates

mod mock_daemon;
mod test_pki;

pub use mock_daemon::{CallLog, MockDaemon, RecordedCall, Reply};
pub use test_pki::{Leaf, TestPki};
