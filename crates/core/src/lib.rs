#![forbid(unsafe_code)]

pub mod error;
pub mod flow;
pub mod model;
pub mod proximity;
pub mod resolver;
pub mod scoring;
pub mod time;

pub use error::Error;
pub use time::Clock;
