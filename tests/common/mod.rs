//! Common test infrastructure
//!
//! Fake collaborators and fixtures for the integration tests. Tests should
//! only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{controller_with, csv_file, MockUploader, TEST_TOKEN};
//!
//! #[tokio::test]
//! async fn test_upload_one() {
//!     let uploader = std::sync::Arc::new(MockUploader::succeeding());
//!     let controller = controller_with(uploader.clone(), Some(TEST_TOKEN));
//!     controller.add_files(vec![csv_file("a.csv")], None);
//!     controller.process_all().await;
//!     assert_eq!(uploader.call_count(), 1);
//! }
//! ```

mod constants;
mod fixtures;
mod uploader;

// Public API - this is what tests import
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{
    analysis_payload, controller_with, controller_with_credentials, csv_file, oversized_file,
    statuses, unsupported_file,
};
#[allow(unused_imports)]
pub use uploader::{MockUploader, RecordedCall};
