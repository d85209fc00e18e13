// src/models/mod.rs

pub mod answer_record;
pub mod page;
pub mod question;
pub mod scoring_record;
pub mod session;
