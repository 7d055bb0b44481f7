//! Vote and view authorization.

pub mod token;

pub use token::{derive_signing_key, generate_seed, TokenAuthorizer, VoteClaims, VoteCredentials};
