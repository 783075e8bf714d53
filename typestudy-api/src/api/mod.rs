//! HTTP API handlers for typestudy-api

pub mod health;
pub mod participants;
pub mod token;
pub mod tracking;
pub mod upload;

pub use health::health_routes;
pub use participants::participant_routes;
pub use token::token_routes;
pub use tracking::tracking_routes;
pub use upload::upload_routes;
