pub mod password;
pub mod tokens;

use crate::db::ObjectId;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;

/// Only the owner of a resource may change or delete it.
pub fn require_owner(user: &CurrentUser, owner: &ObjectId) -> AppResult<()> {
    if &user.id == owner {
        Ok(())
    } else {
        tracing::debug!("User {} denied access to resource owned by {}", user.id, owner);
        Err(AppError::Forbidden)
    }
}
