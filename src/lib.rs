// Library crate exposing modules for integration tests and benchmarks

pub mod config;
pub mod model;
pub mod reconcile;
pub mod repository;
pub mod util;
