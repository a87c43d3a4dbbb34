//! Cryptographic helpers: JWT signing and bcrypt password hashing

pub mod jwt;
pub mod password;

pub use jwt::{
    create_token, create_token_at, parse_ttl, verify_token, verify_token_ignoring_expiry,
    JwtConfig, TokenClaims, TokenError,
};
pub use password::{hash_password, verify_password, DEFAULT_BCRYPT_COST};
