use super::UserRole;

/// Insert payload; the password is already hashed.
#[derive(Debug, Clone)]
pub struct CreateUserDto {
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
}
