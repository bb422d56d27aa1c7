//! HTTP layer for the Librus portal.
//!
//! This module provides the `PortalClient` for the individual portal and
//! Synergia API calls, the `Transport` seam it sends requests through, and
//! the CSRF token extraction used by the login form.

pub mod client;
pub mod csrf;
pub mod transport;

pub use client::{FreshToken, PortalClient};
pub use csrf::extract_csrf_token;
pub use transport::{HttpTransport, Method, PortalRequest, PortalResponse, RequestBody, Transport};
