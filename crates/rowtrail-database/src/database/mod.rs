pub mod introspect;
pub mod migration;
pub mod pool;
pub mod store;

pub use introspect::*;
pub use migration::*;
pub use pool::*;
pub use store::*;
