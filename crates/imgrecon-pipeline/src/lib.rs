//! # imgrecon Pipeline
//!
//! Stream plumbing for reading disk images: the [`ImageWindow`] presents a
//! byte range of an image file as an independent `Read + Seek` stream, the
//! building block for opening a filesystem at a partition's byte offset.

pub mod window;

pub use window::ImageWindow;
