pub mod client;
pub mod config;
pub mod contract;
pub mod instruments;
pub mod logging;
pub mod runner;

// Re-export the handles most callers need so they can depend on the crate
// without knowing the internal module layout.
pub use client::{Client, ServiceError};
pub use config::Config;
pub use instruments::{InstrumentsApi, InstrumentsServiceClient};
