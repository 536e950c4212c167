// src/services/mod.rs
//
// Business logic lives here; HTTP handlers are thin callers.

pub mod analytics;
pub mod session;
