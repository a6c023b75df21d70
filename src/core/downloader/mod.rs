mod client;

pub use client::{file_url_path, Downloader};
