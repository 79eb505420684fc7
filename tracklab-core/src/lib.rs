//! TrackLab Core
//!
//! Core types for the TrackLab learning-track generation console.
//!
//! This crate contains:
//! - Domain types: the B1-B8 step catalog, tracks, profiles, QA reports and
//!   manual debug mode entities
//! - DTOs: request and response bodies of the backend API
//! - Events: the progress stream event sum type and its decoder
//! - Progress: the single-job and batch progress reducers
//! - Presentation: status descriptors shared by every view
//! - Profile form: the editable profile model and its validation

pub mod domain;
pub mod dto;
pub mod events;
pub mod presentation;
pub mod profile_form;
pub mod progress;
