pub mod assets;
pub mod config;
pub mod error;
pub mod frame;
pub mod logging;
pub mod pnl;
pub mod portfolio;
pub mod schedule;
pub mod sweep;
pub mod types;

pub use error::{AipError, AipResult};
