use async_trait::async_trait;

use super::{CreateUserDto, User};
use crate::shared::DomainResult;

#[async_trait]
pub trait UserRepositoryInterface: Send + Sync {
    async fn create_user(&self, dto: CreateUserDto) -> DomainResult<User>;

    async fn get_user_by_id(&self, id: i32) -> DomainResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> DomainResult<Option<User>>;
    async fn count_users(&self) -> DomainResult<u64>;

    async fn update_user_password(&self, id: i32, new_password_hash: &str) -> DomainResult<()>;
    async fn delete_user(&self, id: i32) -> DomainResult<()>;
}
