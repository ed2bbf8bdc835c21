//! Cargo-to-container load planning.
//!
//! Products (quantities of a form factor bound for a destination) are packed
//! into instances of container templates by a greedy first-fit-decreasing
//! heuristic, downsized to the cheapest fitting template and finalized with
//! validation issues. See [`optimizer::optimize`] for the entry point.

pub mod api;
pub mod compat;
pub mod config;
pub mod downsizer;
pub mod finalizer;
pub mod grouping;
pub mod logging;
pub mod model;
pub mod optimizer;
pub mod packer;
pub mod seeding;
pub mod types;
