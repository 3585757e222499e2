pub(crate) mod connected_user;
pub(crate) mod device;

use axum::http::StatusCode;

type RejectionType = (StatusCode, String);
