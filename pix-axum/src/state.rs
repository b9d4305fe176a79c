use std::sync::Arc;

use pix_blob::ImageCoordinator;

use crate::middlewares::MultipartConfig;

/// Shared state handed to every image handler
#[derive(Clone)]
pub struct PixAxumState {
    pub images: ImageCoordinator,
    pub multipart: Arc<MultipartConfig>,
}

impl PixAxumState {
    pub fn new(images: ImageCoordinator, multipart: MultipartConfig) -> Self {
        Self {
            images,
            multipart: Arc::new(multipart),
        }
    }
}
