//! The registry's HTTP surface: the Authorization Engine endpoints and the
//! inbound browser OAuth2 login flow.

pub mod oauth_routes;
pub mod server;

pub use server::{AppState, create_router};
