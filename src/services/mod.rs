pub mod media;
pub mod token;

pub use media::{LocalMediaStore, MediaStore};
pub use token::{TokenError, TokenPair, TokenService};
