//! Domain layer - core entities and repository traits

pub mod user;

pub use user::{CreateUserDto, User, UserRepositoryInterface, UserRole};

pub use crate::shared::{DomainError, DomainResult};
