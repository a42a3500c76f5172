mod lock;
mod primitives;

pub use lock::*;
pub use primitives::*;
