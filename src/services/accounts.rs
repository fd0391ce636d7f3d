use crate::{
    auth::{hash_password, verify_password, AuthService, IssuedToken},
    db::DbPool,
    entities::{
        user::{self, Entity as User},
        user_profile::{self, Entity as UserProfile},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 150, message = "Username must be 3-150 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(max = 150))]
    #[serde(default)]
    pub first_name: String,
    #[validate(length(max = 150))]
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Username or email address
    #[validate(length(min = 1, message = "Username or email is required"))]
    pub login: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: IssuedToken,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub profile: user_profile::Model,
}

/// Fields left out are unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 15, message = "Phone number must be at most 15 characters"))]
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[validate(length(max = 100, message = "Emergency contact must be at most 100 characters"))]
    pub emergency_contact: Option<String>,
    #[validate(length(max = 15, message = "Emergency phone must be at most 15 characters"))]
    pub emergency_phone: Option<String>,
}

/// Registration, login and profile management
#[derive(Clone)]
pub struct AccountService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    auth_service: Arc<AuthService>,
}

impl AccountService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            auth_service,
        }
    }

    /// Creates a customer account and signs it in
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ServiceError> {
        let user = self.create_user(request, false).await?;
        let token = self.auth_service.generate_token(&user)?;
        Ok(AuthResponse {
            user: user.into(),
            token,
        })
    }

    /// Creates a user together with an empty profile
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create_user(
        &self,
        request: RegisterRequest,
        is_staff: bool,
    ) -> Result<user::Model, ServiceError> {
        request.validate()?;
        let username = request.username.trim().to_string();
        let email = request.email.trim().to_lowercase();

        let taken = User::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(username.as_str()))
                    .add(user::Column::Email.eq(email.as_str())),
            )
            .count(&*self.db_pool)
            .await?;
        if taken > 0 {
            return Err(ServiceError::Conflict(
                "Username or email is already registered".to_string(),
            ));
        }

        let password_hash = hash_password(&request.password)?;

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start registration transaction");
            ServiceError::DatabaseError(e)
        })?;

        let now = Utc::now();
        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username),
            email: Set(email),
            first_name: Set(request.first_name.trim().to_string()),
            last_name: Set(request.last_name.trim().to_string()),
            password_hash: Set(password_hash),
            is_staff: Set(is_staff),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        user_profile::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.id),
            phone_number: Set(String::new()),
            address: Set(String::new()),
            date_of_birth: Set(None),
            emergency_contact: Set(String::new()),
            emergency_phone: Set(String::new()),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(user_id = %user.id, "User registered");
        self.event_sender
            .send_or_log(Event::UserRegistered {
                user_id: user.id,
                username: user.username.clone(),
            })
            .await;

        Ok(user)
    }

    /// Accepts either the username or the email address
    #[instrument(skip(self, request))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;
        let login = request.login.trim();

        let user = User::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(login))
                    .add(user::Column::Email.eq(login.to_lowercase())),
            )
            .one(&*self.db_pool)
            .await?;

        let user = match user {
            Some(user) if user.is_active && verify_password(&request.password, &user.password_hash)? => user,
            _ => {
                warn!("Failed login attempt");
                return Err(ServiceError::Unauthorized("Invalid credentials".to_string()));
            }
        };

        let token = self.auth_service.generate_token(&user)?;
        info!(user_id = %user.id, "User logged in");
        Ok(AuthResponse {
            user: user.into(),
            token,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        User::find_by_id(user_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: Uuid) -> Result<ProfileResponse, ServiceError> {
        let user = self.get_user(user_id).await?;
        let profile = self.find_or_create_profile(user_id).await?;
        Ok(ProfileResponse {
            user: user.into(),
            profile,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<ProfileResponse, ServiceError> {
        request.validate()?;
        let user = self.get_user(user_id).await?;
        let profile = self.find_or_create_profile(user_id).await?;

        let email = request.email.map(|e| e.trim().to_lowercase());
        if let Some(email) = email.as_deref().filter(|e| *e != user.email) {
            let taken = User::find()
                .filter(user::Column::Email.eq(email))
                .filter(user::Column::Id.ne(user_id))
                .count(&*self.db_pool)
                .await?;
            if taken > 0 {
                return Err(ServiceError::Conflict(
                    "Email is already registered".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let txn = self.db_pool.begin().await?;

        let mut user_active: user::ActiveModel = user.into();
        if let Some(first_name) = request.first_name {
            user_active.first_name = Set(first_name.trim().to_string());
        }
        if let Some(last_name) = request.last_name {
            user_active.last_name = Set(last_name.trim().to_string());
        }
        if let Some(email) = email {
            user_active.email = Set(email);
        }
        user_active.updated_at = Set(Some(now));
        let user = user_active.update(&txn).await?;

        let mut profile_active: user_profile::ActiveModel = profile.into();
        if let Some(phone_number) = request.phone_number {
            profile_active.phone_number = Set(phone_number.trim().to_string());
        }
        if let Some(address) = request.address {
            profile_active.address = Set(address);
        }
        if let Some(date_of_birth) = request.date_of_birth {
            profile_active.date_of_birth = Set(Some(date_of_birth));
        }
        if let Some(emergency_contact) = request.emergency_contact {
            profile_active.emergency_contact = Set(emergency_contact.trim().to_string());
        }
        if let Some(emergency_phone) = request.emergency_phone {
            profile_active.emergency_phone = Set(emergency_phone.trim().to_string());
        }
        profile_active.updated_at = Set(Some(now));
        let profile = profile_active.update(&txn).await?;

        txn.commit().await?;
        info!(%user_id, "Profile updated");

        Ok(ProfileResponse {
            user: user.into(),
            profile,
        })
    }

    /// Accounts created before profiles existed get an empty one on first access
    async fn find_or_create_profile(
        &self,
        user_id: Uuid,
    ) -> Result<user_profile::Model, ServiceError> {
        let db = &*self.db_pool;
        if let Some(profile) = UserProfile::find()
            .filter(user_profile::Column::UserId.eq(user_id))
            .one(db)
            .await?
        {
            return Ok(profile);
        }

        Ok(user_profile::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            phone_number: Set(String::new()),
            address: Set(String::new()),
            date_of_birth: Set(None),
            emergency_contact: Set(String::new()),
            emergency_phone: Set(String::new()),
            updated_at: Set(None),
        }
        .insert(db)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_rules() {
        let valid = RegisterRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "correct horse".into(),
            first_name: String::new(),
            last_name: String::new(),
        };
        assert!(valid.validate().is_ok());

        let short_name = RegisterRequest {
            username: "al".into(),
            ..valid.clone()
        };
        assert!(short_name.validate().is_err());

        let bad_email = RegisterRequest {
            email: "not-an-email".into(),
            ..valid.clone()
        };
        assert!(bad_email.validate().is_err());

        let weak = RegisterRequest {
            password: "short".into(),
            ..valid
        };
        assert!(weak.validate().is_err());
    }

    #[test]
    fn profile_phone_is_bounded() {
        let request = UpdateProfileRequest {
            phone_number: Some("0123456789012345".into()),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn user_response_omits_hash() {
        let user = user::Model {
            id: Uuid::new_v4(),
            username: "bob".into(),
            email: "bob@example.com".into(),
            first_name: "Bob".into(),
            last_name: "Martin".into(),
            password_hash: "$argon2id$secret".into(),
            is_staff: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        };
        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "bob");
    }
}
