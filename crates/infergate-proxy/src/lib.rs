#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

mod error;
pub mod models;
mod server;
mod stream;

pub use error::ApiError;
pub use server::{create_router, serve};
