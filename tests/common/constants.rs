//! Shared constants for integration tests

#![allow(dead_code)]

/// Bearer token handed to the controller in authenticated tests
pub const TEST_TOKEN: &str = "test-token-123";

/// Client tag forwarded with uploads
pub const TEST_CLIENT_ID: &str = "client-42";

/// Rows reported by the fake analysis endpoint
pub const ANALYSIS_ROW_COUNT: u64 = 12;

/// Flagged rows reported by the fake analysis endpoint
pub const ANALYSIS_FLAGGED_COUNT: u64 = 2;

/// Detail text returned by scripted server failures
pub const TRANSIENT_FAILURE_DETAIL: &str = "Analysis service temporarily unavailable";
