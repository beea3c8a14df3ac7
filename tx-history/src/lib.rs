mod config;
mod error;
mod history;
mod service;
mod store;
mod types;

#[macro_use]
extern crate log;

pub use config::*;
pub use error::*;
pub use history::*;
pub use service::*;
pub use store::*;
pub use types::*;
