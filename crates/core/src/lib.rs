#![forbid(unsafe_code)]

pub mod error;
pub mod mapping;
pub mod model;
pub mod time;

pub use error::{Error, MappingError, ValidationError};
pub use time::Clock;
