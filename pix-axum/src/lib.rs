//! pix-axum: HTTP surface for the pixshelf image host.
//!
//! Mounts upload, download, list and delete routes for images under
//! `/api/images`, backed by a [`pix_blob::ImageCoordinator`].

pub mod app;
pub mod config;
pub mod middlewares;
pub mod rest;
pub mod state;
mod error;
pub use error::{ErrorKind, HttpError, PixAxumError};
pub use state::PixAxumState;

pub use app::{build, AxumApp};
pub use config::{ServerConfig, StorageKind};
