//! HTTP surface: routes, error mapping and correlation middleware

pub mod api;
pub mod request_id;
