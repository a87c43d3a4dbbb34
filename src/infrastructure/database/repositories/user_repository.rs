use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, SqlErr,
};

use crate::domain::{CreateUserDto, User, UserRepositoryInterface, UserRole};
use crate::infrastructure::database::entities::user;
use crate::shared::{DomainError, DomainResult};

pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn entity_role_to_domain(role: user::UserRole) -> UserRole {
    match role {
        user::UserRole::Admin => UserRole::Admin,
    }
}

fn domain_role_to_entity(role: UserRole) -> user::UserRole {
    match role {
        UserRole::Admin => user::UserRole::Admin,
    }
}

fn user_model_to_domain(model: user::Model) -> User {
    User {
        id: model.id,
        username: model.username,
        password_hash: model.password_hash,
        role: entity_role_to_domain(model.role),
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn not_found(id: i32) -> DomainError {
    DomainError::NotFound(format!("User {} not found", id))
}

// ── Repository implementation ───────────────────────────────────

#[async_trait]
impl UserRepositoryInterface for UserRepository {
    async fn create_user(&self, dto: CreateUserDto) -> DomainResult<User> {
        let now = Utc::now();

        let new_user = user::ActiveModel {
            username: Set(dto.username),
            password_hash: Set(dto.password_hash),
            role: Set(domain_role_to_entity(dto.role)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = new_user.insert(&self.db).await.map_err(|e| {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = e.sql_err() {
                DomainError::Conflict("用户名已存在".to_string())
            } else {
                DomainError::from(e)
            }
        })?;

        Ok(user_model_to_domain(model))
    }

    async fn get_user_by_id(&self, id: i32) -> DomainResult<Option<User>> {
        let model = user::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(user_model_to_domain))
    }

    async fn get_user_by_username(&self, username: &str) -> DomainResult<Option<User>> {
        let model = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?;

        Ok(model.map(user_model_to_domain))
    }

    async fn count_users(&self) -> DomainResult<u64> {
        Ok(user::Entity::find().count(&self.db).await?)
    }

    async fn update_user_password(&self, id: i32, new_password_hash: &str) -> DomainResult<()> {
        let Some(existing) = user::Entity::find_by_id(id).one(&self.db).await? else {
            return Err(not_found(id));
        };

        let mut active: user::ActiveModel = existing.into();
        active.password_hash = Set(new_password_hash.to_string());
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;

        Ok(())
    }

    async fn delete_user(&self, id: i32) -> DomainResult<()> {
        let result = user::Entity::delete_by_id(id).exec(&self.db).await?;

        if result.rows_affected == 0 {
            return Err(not_found(id));
        }

        Ok(())
    }
}
