//! Authentication primitives.
//!
//! - [`password`]: Argon2id hashing and the password rules.
//! - [`jwt`]: HS256 token issue and validation.
//! - [`extractor`]: axum extractors resolving the caller from a bearer token.

pub mod extractor;
pub mod jwt;
pub mod password;

pub use extractor::{AuthUser, MaybeAuthUser};
pub use jwt::{Claims, JwtConfig, TokenLifetime};
