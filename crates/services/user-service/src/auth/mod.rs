//! Bearer-token authentication.

mod token;

pub use token::{credential_from_metadata, Claims, IssuedToken, TokenService};
