//! Integration test harness.

mod mock_driver;
mod pipeline;
