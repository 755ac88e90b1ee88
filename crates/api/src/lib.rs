//! Harvest, supply and billing HTTP services over the agrochain crates.

pub mod app;
pub mod config;
