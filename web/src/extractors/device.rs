use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{request::Parts, StatusCode},
};
use delivery::DeviceClass;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct DeviceParams {
    device: String,
}

/// Device class named by the `device` query parameter, case-insensitive.
pub(crate) struct ConnectingDevice(pub DeviceClass);

#[async_trait]
impl<S> FromRequestParts<S> for ConnectingDevice
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<DeviceParams>::from_request_parts(parts, state)
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;

        params
            .device
            .parse::<DeviceClass>()
            .map(ConnectingDevice)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
    }
}
