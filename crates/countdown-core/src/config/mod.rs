//! Configuration system for Countdown

pub mod defaults;
mod duration;
mod loader;
mod types;
pub mod validation;

pub use defaults::*;
pub use duration::*;
pub use loader::*;
pub use types::*;
pub use validation::*;
