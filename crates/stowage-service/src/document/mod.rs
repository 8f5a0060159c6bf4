//! Document read paths.

pub mod download;

pub use download::{DownloadLink, DownloadService};
