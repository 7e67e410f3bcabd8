use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::{self, tokens};
use crate::db::models::{AccountView, UserView};
use crate::db::ObjectId;
use crate::error::{AppError, AppResult};
use crate::extractors::{BearerToken, JsonBody};
use crate::state::AppState;
use crate::store::{LoginSelector, NewUser, UserChanges};
use crate::validation::{self, Validator};

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "password")]
    pub plaintext_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "plaintextPassword")]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "password")]
    pub plaintext_password: Option<String>,
}

#[derive(Debug, PartialEq)]
pub struct Registration {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, PartialEq)]
pub struct Credentials {
    pub login: LoginSelector,
    pub password: String,
}

/// Validated profile changes; the password is hashed by the handler.
#[derive(Debug, Default, PartialEq)]
pub struct ProfileUpdate {
    pub changes: UserChanges,
    pub password: Option<String>,
}

impl RegisterRequest {
    pub fn validate(self) -> AppResult<Registration> {
        let mut v = Validator::new();
        let username = v.required("username", self.username, validation::username);
        let display_name = v.optional("displayName", self.display_name, |s| {
            validation::text(s, 1, 64)
        });
        let email = v.required("email", self.email, validation::email);
        let password = v.required(
            "plaintextPassword",
            self.plaintext_password,
            validation::password,
        );
        v.finish()?;

        let (Some(username), Some(email), Some(password)) = (username, email, password) else {
            return Err(AppError::BadRequest("Incomplete registration".into()));
        };
        Ok(Registration {
            display_name: display_name.unwrap_or_else(|| username.clone()),
            username,
            email,
            password,
        })
    }
}

impl LoginRequest {
    pub fn validate(self) -> AppResult<Credentials> {
        let mut v = Validator::new();
        let login = match (self.username, self.email) {
            (Some(username), None) => v
                .check("username", validation::text(username, 1, 32))
                .map(LoginSelector::Username),
            (None, Some(email)) => v
                .check("email", validation::text(email, 1, 254))
                .map(|email| LoginSelector::Email(email.to_lowercase())),
            _ => {
                v.error("username", "provide exactly one of username or email");
                None
            }
        };
        let password = v.required("password", self.password, |s| {
            if s.is_empty() {
                Err("must not be empty".to_string())
            } else {
                Ok(s)
            }
        });
        v.finish()?;

        let (Some(login), Some(password)) = (login, password) else {
            return Err(AppError::BadRequest("Incomplete credentials".into()));
        };
        Ok(Credentials { login, password })
    }
}

impl UpdateUserRequest {
    pub fn validate(self) -> AppResult<ProfileUpdate> {
        let mut v = Validator::new();
        let update = ProfileUpdate {
            changes: UserChanges {
                username: v.optional("username", self.username, validation::username),
                display_name: v.optional("displayName", self.display_name, |s| {
                    validation::text(s, 1, 64)
                }),
                email: v.optional("email", self.email, validation::email),
                password_hash: None,
            },
            password: v.optional(
                "plaintextPassword",
                self.plaintext_password,
                validation::password,
            ),
        };
        v.finish()?;

        if update.changes.is_empty() && update.password.is_none() {
            return Err(AppError::BadRequest(
                "Update contains no recognized fields".into(),
            ));
        }
        Ok(update)
    }
}

// -- Router --

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/{id}", get(get_user).patch(update_user).delete(delete_user))
}

// -- Handlers --

/// POST /users - register and log in
async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AccountView>)> {
    let registration = req.validate()?;
    let password_hash =
        hash_password_blocking(registration.password, state.config.auth.bcrypt_cost).await?;

    let mut user = state
        .store
        .create_user(NewUser {
            username: registration.username,
            display_name: registration.display_name,
            email: registration.email,
            password_hash,
        })
        .await?;
    let token = tokens::issue_token(state.store.as_ref(), &user.id).await?;
    user.token = Some(token);

    tracing::info!("Registered user {} ({})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(AccountView::with_token(&user))))
}

/// POST /users/login - exchange credentials for a fresh token
async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Json<AccountView>> {
    let credentials = req.validate()?;

    let mut user = state
        .store
        .find_user_by_login(&credentials.login)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password_blocking(credentials.password, user.password_hash.clone()).await? {
        tracing::debug!("Password mismatch for user {}", user.id);
        return Err(AppError::InvalidCredentials);
    }

    let token = tokens::issue_token(state.store.as_ref(), &user.id).await?;
    user.token = Some(token);

    tracing::info!("User {} logged in", user.id);
    Ok(Json(AccountView::with_token(&user)))
}

/// POST /users/logout - invalidate the caller's token
async fn logout(State(state): State<AppState>, bearer: BearerToken) -> AppResult<StatusCode> {
    let user = bearer.authenticate(state.store.as_ref()).await?;
    tokens::revoke_token(state.store.as_ref(), &user.id).await?;

    tracing::info!("User {} ({}) logged out", user.username, user.id);
    Ok(StatusCode::NO_CONTENT)
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<UserView>> {
    let id = ObjectId::parse(&id)?;
    let user = state.store.find_user(&id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(UserView::from(&user)))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    bearer: BearerToken,
    JsonBody(req): JsonBody<UpdateUserRequest>,
) -> AppResult<Json<AccountView>> {
    let id = ObjectId::parse(&id)?;
    let ProfileUpdate {
        mut changes,
        password,
    } = req.validate()?;
    let user = bearer.authenticate(state.store.as_ref()).await?;

    let target = state.store.find_user(&id).await?.ok_or(AppError::NotFound)?;
    auth::require_owner(&user, &target.id)?;

    if let Some(password) = password {
        changes.password_hash =
            Some(hash_password_blocking(password, state.config.auth.bcrypt_cost).await?);
    }
    let updated = state.store.update_user(&id, &changes).await?;

    tracing::info!("Updated user {}", id);
    Ok(Json(AccountView::without_token(&updated)))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    bearer: BearerToken,
) -> AppResult<StatusCode> {
    let id = ObjectId::parse(&id)?;
    let user = bearer.authenticate(state.store.as_ref()).await?;

    let target = state.store.find_user(&id).await?.ok_or(AppError::NotFound)?;
    auth::require_owner(&user, &target.id)?;
    state.store.delete_user(&id).await?;

    tracing::info!("Deleted user {}", id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_names(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation(errors) => {
                errors.fields().iter().map(|e| e.field.clone()).collect()
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn registration_defaults_display_name_to_username() {
        let reg = RegisterRequest {
            username: Some("Bob123".into()),
            display_name: None,
            email: Some("Bob@X.com".into()),
            plaintext_password: Some("pw123456".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(reg.display_name, "Bob123");
        assert_eq!(reg.email, "bob@x.com");
    }

    #[test]
    fn registration_reports_every_bad_field() {
        let err = RegisterRequest {
            username: Some("b".into()),
            display_name: None,
            email: Some("nope".into()),
            plaintext_password: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            field_names(err),
            vec!["username", "email", "plaintextPassword"]
        );
    }

    #[test]
    fn registration_accepts_password_alias() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"username":"Bob123","email":"bob@x.com","password":"pw123456"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn login_needs_exactly_one_selector() {
        let both = LoginRequest {
            username: Some("bob".into()),
            email: Some("bob@x.com".into()),
            password: Some("pw123456".into()),
        };
        assert_eq!(field_names(both.validate().unwrap_err()), vec!["username"]);

        let neither = LoginRequest {
            username: None,
            email: None,
            password: Some("pw123456".into()),
        };
        assert!(neither.validate().is_err());

        let by_email = LoginRequest {
            username: None,
            email: Some("Bob@X.com".into()),
            password: Some("pw123456".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(by_email.login, LoginSelector::Email("bob@x.com".into()));
    }

    #[test]
    fn login_requires_password() {
        let err = LoginRequest {
            username: Some("bob".into()),
            email: None,
            password: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(field_names(err), vec!["password"]);
    }

    #[test]
    fn empty_profile_update_is_rejected() {
        let err = UpdateUserRequest::default().validate().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn profile_update_keeps_only_given_fields() {
        let update = UpdateUserRequest {
            display_name: Some("  Robert ".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(update.changes.display_name.as_deref(), Some("Robert"));
        assert!(update.changes.username.is_none());
        assert!(update.password.is_none());
    }
}
