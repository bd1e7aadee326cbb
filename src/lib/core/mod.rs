pub mod error;
pub mod frame;
pub mod message;
pub mod topics;

pub use error::*;
pub use frame::*;
pub use message::*;
