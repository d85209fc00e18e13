// src/handlers/mod.rs

pub mod admin;
pub mod answer;
pub mod scoring;
pub mod session;
