//! Control-flow metrics over method bodies, used to score obfuscation passes.

pub mod metrics;

pub use metrics::{Metrics, collect_metrics, compare};
