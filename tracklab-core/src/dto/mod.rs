//! Data Transfer Objects for the backend API
//!
//! Request bodies and response envelopes exchanged with the generation
//! backend. Read models shared by several endpoints live in `domain`.

pub mod health;
pub mod manual;
pub mod profile;
pub mod qa;
pub mod track;
