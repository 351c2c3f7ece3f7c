mod column;
mod operand;
mod predicate;
mod projection;

pub use column::*;
pub use operand::*;
pub use predicate::*;
pub use projection::*;
