pub mod audit;
pub mod runner;
pub mod types;

pub use audit::*;
pub use runner::*;
pub use types::*;
