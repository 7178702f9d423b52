//! Shared domain and wire type definitions for Taskhub.

pub mod comment;
pub mod eligibility;
pub mod entity;
pub mod event;
pub mod project;
pub mod skill;
pub mod task;
