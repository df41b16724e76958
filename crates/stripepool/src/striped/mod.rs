mod config;
mod executor;

pub use config::*;
pub use executor::*;
