#![doc = "gclass-core: core logic library for gclass."]

//! This crate holds everything the `gclass` binary needs that does not talk
//! HTTP itself: domain types, the service traits the concrete Google clients
//! implement, the credential lifecycle, local settings, pagination and the
//! assignment submission workflow.
//!
//! # Usage
//! Concrete Classroom / Drive / OAuth clients live in the `gclass` crate and
//! implement the traits in [`contract`]. Tests use the `mockall` mocks exported
//! behind the default `test-export-mocks` feature.

pub mod config;
pub mod contract;
pub mod credential;
pub mod links;
pub mod listing;
pub mod settings;
pub mod submission;
