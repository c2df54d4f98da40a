//! HTTP surface for the game engine
//!
//! Thin JSON adapter over [`GameEngine`](crate::games::GameEngine). Caller
//! identity arrives in the `x-caller` header; the engine does all validation.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod websocket;

pub use handlers::AppState;
pub use server::{build_app, ApiServer};
