pub mod config;
pub mod error;
pub mod error_recovery;
pub mod error_utils;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::*;
pub use error_recovery::*;
pub use error_utils::*;
pub use stats::*;
pub use traits::*;
pub use types::*;
