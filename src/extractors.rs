use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::db::ObjectId;
use crate::error::AppError;
use crate::policy::VoteMode;
use crate::state::AppState;
use crate::store::{Page, UserRepository};

/// Represents the user behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: ObjectId,
    pub username: String,
    pub display_name: String,
}

/// Raw token from the configured header, not yet checked against the store.
///
/// Handlers validate their input first and only then call
/// [`BearerToken::authenticate`], so malformed requests never reach the store.
#[derive(Debug, Clone)]
pub struct BearerToken(pub Option<String>);

impl FromRequestParts<AppState> for BearerToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(BearerToken(
            extract_token(parts, &state.config.auth.token_header).map(str::to_string),
        ))
    }
}

impl BearerToken {
    /// Resolve the token to a user. Returns 401 if the token is missing or
    /// matches no user.
    pub async fn authenticate<S>(self, store: &S) -> Result<CurrentUser, AppError>
    where
        S: UserRepository + ?Sized,
    {
        let token = self.0.ok_or(AppError::Unauthorized)?;
        let user = store
            .find_user_by_token(&token)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(CurrentUser {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
        })
    }
}

/// Token from the configured header; a leading `Bearer ` is tolerated.
fn extract_token<'a>(parts: &'a Parts, header_name: &str) -> Option<&'a str> {
    let raw = parts.headers.get(header_name)?.to_str().ok()?.trim();
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// JSON body whose rejections are reported as `AppError::BadRequest`.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

/// Query string whose rejections are reported as `AppError::BadRequest`.
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(QueryParams(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageParams {
    pub fn into_page(self) -> Result<Page, AppError> {
        let limit = self.limit.unwrap_or(Page::DEFAULT_LIMIT);
        if limit == 0 || limit > Page::MAX_LIMIT {
            return Err(AppError::BadRequest(format!(
                "limit must be between 1 and {}",
                Page::MAX_LIMIT
            )));
        }
        Ok(Page {
            limit,
            offset: self.offset.unwrap_or(0),
        })
    }
}

/// `?delta=true` switches vote fields from absolute values to deltas.
#[derive(Debug, Default, Deserialize)]
pub struct VoteParams {
    #[serde(default)]
    pub delta: bool,
}

impl VoteParams {
    pub fn mode(&self) -> VoteMode {
        VoteMode::from_delta_flag(self.delta)
    }
}
