//! Fiscal and distributional impact model for capping tax-advantaged
//! salary-sacrifice pension contributions: a pure reform transform, a
//! scenario runner over a microsimulation seam, and weighted-aggregation
//! reporting against published reference figures.

pub mod api;
pub mod core;
pub mod data;
pub mod error;
pub mod output;
