//! Correlation of alerts against independently-sourced ground reports.

pub mod area;
pub mod category;
pub mod engine;

pub use area::{AreaIndex, StaticAreaIndex};
pub use engine::{Correlation, Engine, VerifyOutcome, VerifyStats};
