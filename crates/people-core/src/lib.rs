//! Core types and trait definitions for the people data-access layer.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! store and cache collaborators are expressed as traits; concrete backends
//! live in `people-store-sqlite` and `people-cache`.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod attribute;
pub mod cache;
pub mod context;
pub mod error;
pub mod id;
pub mod person;
pub mod repository;
pub mod store;

pub use error::{Error, Result};
pub use repository::PersonRepository;
