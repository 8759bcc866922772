//! idle-logoutd - inactivity warning and forced logout for desktop sessions.
//!
//! The [`monitor::InactivityMonitor`] task tracks user activity, publishes
//! [`domain::InactivityEvent`]s on an [`channel::EventChannel`] when the idle
//! threshold passes, and runs a [`logout::LogoutHandler`] once the grace period
//! runs out.

pub mod activity;
pub mod channel;
pub mod config;
pub mod domain;
pub mod logout;
pub mod monitor;
pub mod session;
pub mod tracker;
