pub mod entry;
pub mod library;

pub use entry::*;
pub use library::*;
