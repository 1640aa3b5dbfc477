pub mod error;
pub mod types;

pub use error::{FirmgateError, Result};
pub use types::{Role, UserContext};
