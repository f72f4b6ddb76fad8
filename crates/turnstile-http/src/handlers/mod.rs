//! Route handlers for the coordinated demo endpoints.

pub mod activities;
pub mod register;
