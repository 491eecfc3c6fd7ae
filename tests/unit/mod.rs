//! Unit tests for individual components

mod error_test;
mod diagnostics_test;
mod config_test;
mod util_test;
mod builders_test;
mod runtime_test;
mod state_store_test;
