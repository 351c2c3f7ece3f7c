pub use quarry_core::*;
pub use quarry_macros::Entity;
