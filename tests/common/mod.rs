//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{catalog_service, FakeCatalogSource, TestStore, SERVICE_1_ID};
//!
//! #[test]
//! fn test_sync() {
//!     let test = TestStore::new();
//!     let source = FakeCatalogSource::new().with_service(catalog_service(SERVICE_1_ID), vec![]);
//!     // ...
//! }
//! ```

mod constants;
mod fake_source;
mod fixtures;

// Public API - this is what tests import
pub use constants::*;
pub use fake_source::FakeCatalogSource;
#[allow(unused_imports)]
pub use fixtures::{catalog_service, catalog_sku, effective_time, pricing_snapshot, TestStore};
