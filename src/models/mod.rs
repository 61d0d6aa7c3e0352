pub mod claim;
pub mod order;

pub use claim::*;
pub use order::*;
