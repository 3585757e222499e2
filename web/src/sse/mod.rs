//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the `/events` endpoint.
//! The delivery core (registry, router, envelopes) lives in the `delivery`
//! crate.

pub mod handler;
