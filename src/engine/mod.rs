// src/engine/mod.rs

//! Storage-free rules of the assessment engine.

pub mod assignment;
pub mod grading;
pub mod lifecycle;
