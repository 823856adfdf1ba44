// =============================================================================
// Birds — egg mini-game endpoint
// =============================================================================

pub mod client;

pub use client::BirdsClient;
