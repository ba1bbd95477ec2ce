//! Command handlers.
//!
//! Each handler takes the validated configuration, does its work and
//! formats output for the terminal. Composition happens in
//! [`crate::bootstrap`].

pub mod check_config;
pub mod models;
pub mod serve;
