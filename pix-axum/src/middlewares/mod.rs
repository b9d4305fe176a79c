pub mod multipart;

pub use multipart::{ImageIntake, MultipartConfig};
