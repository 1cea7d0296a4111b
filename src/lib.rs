//! dashpass: a small dashboard behind single sign-on.
//!
//! Users log in through one of several configured providers; every
//! successful login is resolved to a persisted user, which becomes the
//! session principal shown by the dashboard.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod identity;
pub mod multipass;
pub mod session;
