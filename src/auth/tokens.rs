use rand::Rng;

use crate::db::ObjectId;
use crate::error::{AppError, AppResult};
use crate::store::{StoreError, UserRepository};

/// Fresh draws allowed before giving up on finding an unused token.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// Generate a cryptographically random 32-byte hex token.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Mint a token for `user_id`, persist it and return it.
///
/// Any previously issued token for the user stops working. A candidate
/// already held by another user is discarded and redrawn.
pub async fn issue_token<S>(store: &S, user_id: &ObjectId) -> AppResult<String>
where
    S: UserRepository + ?Sized,
{
    for _ in 0..MAX_ISSUE_ATTEMPTS {
        let token = generate_token();
        if store.token_in_use(&token).await? {
            tracing::warn!("Token collision while issuing for user {}", user_id);
            continue;
        }
        match store.set_token(user_id, Some(&token)).await {
            Ok(()) => return Ok(token),
            // Lost a race against a concurrent issuance of the same value.
            Err(StoreError::Conflict(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Internal(
        "could not allocate a unique token".to_string(),
    ))
}

/// Log a user out by clearing their stored token.
pub async fn revoke_token<S>(store: &S, user_id: &ObjectId) -> AppResult<()>
where
    S: UserRepository + ?Sized,
{
    store.set_token(user_id, None).await?;
    Ok(())
}
