//! Core types for baton.

pub mod item;
pub mod settings;
pub mod stream;
pub mod usage;

pub use item::*;
pub use settings::*;
pub use stream::*;
pub use usage::*;
