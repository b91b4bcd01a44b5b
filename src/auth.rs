//! Credential models and the token lifecycle manager.

pub mod manager;
pub mod metrics;
pub mod token;

pub use manager::*;
pub use metrics::RefreshMetrics;
pub use token::{record::*, secret::*};
