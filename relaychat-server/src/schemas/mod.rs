//! Request / response types of the HTTP API, with OpenAPI schemas.
//!
//! JSON shapes match the shared types in `relaychat-types`, which is what
//! clients deserialize into.

pub mod api;
