use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use log::*;

/// Header carrying the user id established by the upstream authenticator.
pub(crate) const USER_ID_HEADER: &str = "x-user-id";

pub(crate) struct ConnectedUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ConnectedUser
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match user_id {
            Some(user_id) => Ok(ConnectedUser(user_id.to_string())),
            None => {
                debug!("Rejecting request without {USER_ID_HEADER} header");
                Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))
            }
        }
    }
}
