//! Cache generation lifecycle.
//!
//! - [`state`]: per-generation phase machine
//! - [`clients`]: registry of open clients and which generation controls them
//! - [`controller`]: the install/activate/fetch handlers

pub mod clients;
pub mod controller;
pub mod state;
