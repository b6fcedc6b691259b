//! Upload Module
//!
//! Turns client uploads into an ordered [`UploadSet`] and checks it against
//! the target tool's policy before any conversion work starts.

pub mod types;
pub mod validator;

pub use types::*;
pub use validator::validate;
