//! Request and response bodies of the HTTP API.

pub mod common;
pub mod music;
pub mod task;
pub mod upload;
