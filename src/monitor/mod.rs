// =============================================================================
// Position Monitoring Module
// =============================================================================
//
// Threshold-triggered close of leveraged positions. One pass per scheduler
// tick; the only state carried between passes is the immutable
// `ThresholdConfig`.

pub mod position_monitor;

pub use position_monitor::{evaluate_positions, MonitorOutcome, MonitorReport};
