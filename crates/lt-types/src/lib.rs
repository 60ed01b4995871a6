pub mod point;
pub mod config;
pub mod cell;
pub mod summary;
pub mod events;
pub mod errors;

pub use point::*;
pub use config::*;
pub use cell::*;
pub use summary::*;
pub use events::*;
pub use errors::*;
