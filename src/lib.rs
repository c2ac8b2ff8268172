pub mod archive;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod model;
pub mod pip;
pub mod progress;
pub mod resolver;
pub mod script;

mod api;

pub use api::{Condafetch, CondafetchBuilder};
