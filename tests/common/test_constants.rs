//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// API key used by test clients.
pub const API_KEY: &str = "test-api-key";

/// Secret key used by test clients.
pub const SECRET_KEY: &str = "test-secret";

/// Path of the management API on the mock server.
pub const API_PATH: &str = "/client/api";
