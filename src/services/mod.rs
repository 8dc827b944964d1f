// src/services/mod.rs

pub mod assignment;
pub mod audit;
pub mod events;
pub mod grading;
pub mod overrides;
pub mod session;
pub mod store;
