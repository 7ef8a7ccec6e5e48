//! Session credentials and the locally cached user identity.

pub mod identity;
pub mod token;

pub use identity::*;
pub use token::*;
