pub mod enums;
pub mod metadata;

pub use enums::*;
pub use metadata::*;
