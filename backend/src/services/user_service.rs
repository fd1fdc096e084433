//! User administration.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::check_email;
use crate::models::user::{NewUser, User, UserChanges};
use crate::services::auth_service::AuthService;
use crate::storage::{CatalogueStore, UserPage};

const USERNAME_MAX_LEN: usize = 150;

/// Fields for creating a user account.
#[derive(Clone, Default)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub password: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

redacted_debug!(CreateUser {
    show username,
    show email,
    redact_option password,
    show first_name,
    show last_name,
    show is_staff,
    show is_superuser,
});

/// Partial user update; `None` leaves the field untouched.
#[derive(Clone, Default)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
}

redacted_debug!(UpdateUser {
    show email,
    show first_name,
    show last_name,
    redact_option password,
    show is_active,
    show is_staff,
    show is_superuser,
});

/// Usernames follow the usual account rules: letters, digits and `@.+-_`.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() || username.chars().count() > USERNAME_MAX_LEN {
        return Err(AppError::Validation(format!(
            "username must be between 1 and {} characters",
            USERNAME_MAX_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        return Err(AppError::Validation(
            "username may contain only letters, digits and @/./+/-/_".into(),
        ));
    }
    Ok(())
}

pub struct UserService {
    store: Arc<dyn CatalogueStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn CatalogueStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, search: Option<&str>, page: u32, per_page: u32) -> Result<UserPage> {
        let offset = (page.saturating_sub(1) as i64) * per_page as i64;
        self.store.list_users(search, offset, per_page as i64).await
    }

    pub async fn get(&self, id: Uuid) -> Result<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    pub async fn find_by_username(&self, username: &str) -> Result<User> {
        self.store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User \"{}\" does not exist", username)))
    }

    /// Create an account. Without a password the account cannot log in
    /// until one is set, but can still use an API token.
    pub async fn create(&self, request: CreateUser) -> Result<User> {
        validate_username(&request.username)?;
        check_email("email", &request.email)?;

        let password_hash = match request.password.as_deref() {
            Some(password) if !password.is_empty() => AuthService::hash_password(password)?,
            _ => "!".to_string(),
        };

        let user = self
            .store
            .create_user(NewUser {
                username: request.username,
                email: request.email,
                first_name: request.first_name,
                last_name: request.last_name,
                password_hash,
                is_staff: request.is_staff,
                is_superuser: request.is_superuser,
            })
            .await?;
        tracing::info!(username = %user.username, is_superuser = user.is_superuser, "User created");
        Ok(user)
    }

    pub async fn update(&self, id: Uuid, request: UpdateUser) -> Result<User> {
        if let Some(email) = &request.email {
            check_email("email", email)?;
        }
        let password_hash = match request.password.as_deref() {
            Some("") => return Err(AppError::Validation("password may not be blank".into())),
            Some(password) => Some(AuthService::hash_password(password)?),
            None => None,
        };

        self.store
            .update_user(
                id,
                UserChanges {
                    email: request.email,
                    first_name: request.first_name,
                    last_name: request.last_name,
                    password_hash,
                    is_active: request.is_active,
                    is_staff: request.is_staff,
                    is_superuser: request.is_superuser,
                },
            )
            .await
    }

    /// Delete an account. Administrators cannot delete themselves.
    pub async fn delete(&self, acting_user: Uuid, id: Uuid) -> Result<()> {
        if acting_user == id {
            return Err(AppError::Validation("You cannot delete your own account".into()));
        }
        self.store.delete_user(id).await?;
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn service() -> UserService {
        UserService::new(Arc::new(MemoryStore::new()))
    }

    fn request(username: &str) -> CreateUser {
        CreateUser {
            username: username.into(),
            email: format!("{}@example.org", username),
            ..Default::default()
        }
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("jane.doe+lab@x").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("with space").is_err());
        assert!(validate_username(&"u".repeat(151)).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let req = CreateUser {
            password: Some("hunter2".into()),
            ..request("jane")
        };
        assert!(!format!("{:?}", req).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_create_without_password_cannot_log_in() {
        let service = service();
        let user = service.create(request("robot")).await.unwrap();
        assert!(!AuthService::verify_password("", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let service = service();
        service.create(request("jane")).await.unwrap();
        let err = service.create(request("jane")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_flags_and_delete() {
        let service = service();
        let admin = service.create(request("admin")).await.unwrap();
        let user = service.create(request("jane")).await.unwrap();

        let updated = service
            .update(
                user.id,
                UpdateUser {
                    is_staff: Some(true),
                    first_name: Some("Jane".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_staff);
        assert_eq!(updated.first_name, "Jane");
        assert_eq!(updated.email, "jane@example.org");

        assert!(service.delete(admin.id, admin.id).await.is_err());
        service.delete(admin.id, user.id).await.unwrap();
        assert!(matches!(service.get(user.id).await, Err(AppError::NotFound(_))));

        let page = service.list(None, 1, 20).await.unwrap();
        assert_eq!(page.total, 1);
    }
}
