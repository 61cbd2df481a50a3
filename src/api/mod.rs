//! HTTP surface for NewsTrends.
//!
//! ## Pages
//!
//! - `GET /` - Top headlines, advertisements and subscription status
//! - `GET /category/:name` - Headlines for one category
//! - `GET|POST /login` - Log in form
//! - `GET|POST /register` - Registration form
//! - `POST /logout` - End the session
//! - `POST /unsubscribe` - Cancel the subscription
//! - `GET /subscribe` - Payment page
//! - `POST /subscribe/process` - Activate the subscription
//! - `GET /subscribe/success` - Confirmation page
//!
//! ## JSON API
//!
//! - `POST /api/register` - Create an account, returns an API token
//! - `GET /api/ads` - List advertisements
//! - `GET /api/me` - Current user and subscription state
//! - `GET /api/health` - Health check
//!
//! Method and authentication rules for every route live in [`gate`].

pub mod gate;
mod pages;
mod rest;
mod routes;
pub mod session;
pub mod types;
mod views;

#[cfg(test)]
mod tests;

pub use routes::{build_router, serve, AppState};
