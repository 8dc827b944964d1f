// src/models/mod.rs

pub mod answer;
pub mod assignment;
pub mod attempt;
pub mod competency;
pub mod event;
pub mod question;
