pub mod builtin;
pub mod configs;
pub mod connector;
pub mod error;
pub mod interface;
pub mod message;
pub mod normalize;
pub mod pool;
pub mod record;
pub mod worker;

pub use error::Result;

#[macro_use]
extern crate async_trait;

#[macro_use]
extern crate log;
