// =============================================================================
// Vooi — autotrade, leveraged positions and rates endpoint
// =============================================================================
//
// `wire` turns raw JSON bodies into domain types; `client` does the HTTP.

pub mod client;
pub mod wire;

pub use client::VooiClient;
