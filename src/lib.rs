//! On-demand image resizing service.
//!
//! Requests name a resize template and an image path. Resized artifacts are
//! cached on local disk and, optionally, in the object store holding the
//! originals, so each template/path pair is only produced once.

pub mod cache;
pub mod config;
pub mod errors;
pub mod imaging;
pub mod observability;
pub mod orchestrator;
pub mod storage;
pub mod template;
pub mod web;

pub use config::Config;
pub use errors::{AppError, AppResult};
pub use orchestrator::{ImageRequest, Orchestrator, ServedImage};
