//! # docshift
//!
//! A file-conversion service: upload a document, spreadsheet, or image,
//! pick a target format, and get the converted file back as a download.
//!
//! ## Architecture
//!
//! ```text
//! POST /convert (multipart: file, target_format)
//!  │
//!  ├─ 1. Validate   extension, target, size; resolve (source, target)
//!  ├─ 2. Stage      write upload to <work_dir>/<stem>-<random>.<ext>
//!  ├─ 3. Convert    blocking pool, bounded by a semaphore
//!  ├─ 4. Stream     64 KiB chunks as an attachment
//!  └─ 5. Clean up   both temp files, once, on every path
//! ```
//!
//! The router ([`router::resolve`]) is a static table of ordered pairs. The
//! lifecycle ([`ConversionService`]) owns every temporary file it creates
//! through an [`lifecycle::ArtifactGuard`], so a failed, panicking, or
//! aborted request never leaves anything behind.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docshift::{ConversionRequest, ConversionService, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ConversionService::new(ServiceConfig::default())?;
//!     let request = ConversionRequest::new("notes.txt", b"hello".to_vec(), "pdf");
//!     let converted = service.convert(request).await?;
//!     println!("{} ({} bytes)", converted.file_name(), converted.len());
//!     let pdf = converted.into_bytes().await?;
//!     assert!(pdf.starts_with(b"%PDF"));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docshift` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the library:
//! ```toml
//! docshift = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converters;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod router;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder, DEFAULT_MAX_UPLOAD_BYTES};
pub use converters::{Converter, NativeConverter};
pub use error::{ConvertError, ErrorKind, RequestError};
pub use format::{Format, TargetSpec};
pub use lifecycle::{ConversionRequest, ConversionService, ConvertedFile, RequestState};
pub use router::{capabilities, resolve, ConverterKind, Resolution, Route};
