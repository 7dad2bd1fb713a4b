//! Error types for docshift.
//!
//! Two distinct error types reflect two distinct layers:
//!
//! * [`ConvertError`]: a single converter failed (corrupt input, codec
//!   error, missing render engine). Converters return it and nothing else.
//!
//! * [`RequestError`]: the outcome of a whole conversion request as seen by
//!   the caller. Every [`ConvertError`], panic, and filesystem fault is folded
//!   into one of its variants at the lifecycle boundary, so callers only ever
//!   have to map one type to a status code.

use crate::format::Format;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of one converter invocation.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The input claims to be a PDF but does not start with `%PDF`.
    #[error("file is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// lopdf could not parse or build the document.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// An OOXML package (docx/pptx/xlsx) is missing a part or is malformed.
    #[error("{format} package is invalid: {detail}")]
    Package { format: Format, detail: String },

    /// Image decoding or encoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The spreadsheet reader rejected the workbook.
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The pdfium shared library could not be bound.
    #[error(
        "PDF rendering engine unavailable: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install libpdfium system-wide."
    )]
    RenderEngine(String),

    /// pdfium loaded the library but failed on this document or page.
    #[error("rasterisation failed for page {page}: {detail}")]
    Rasterisation { page: usize, detail: String },

    /// The converter finished but produced nothing.
    #[error("converter produced no output")]
    EmptyOutput,

    /// Reading the staged input or writing the output failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn package(format: Format, detail: impl std::fmt::Display) -> Self {
        ConvertError::Package {
            format,
            detail: detail.to_string(),
        }
    }
}

impl From<lopdf::Error> for ConvertError {
    fn from(e: lopdf::Error) -> Self {
        ConvertError::Pdf(e.to_string())
    }
}

impl From<calamine::Error> for ConvertError {
    fn from(e: calamine::Error) -> Self {
        ConvertError::Spreadsheet(e.to_string())
    }
}

/// Coarse classification used for logging and for the HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    UnsupportedConversion,
    ConversionError,
    IoError,
    /// Rejected service settings; never produced by a request.
    ConfigError,
}

/// Outcome of a failed conversion request.
#[derive(Debug, Error)]
pub enum RequestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Missing file or format, unrecognised extension, empty upload.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upload exceeded the configured ceiling.
    #[error("Upload exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: usize },

    /// Both formats are known but no converter is registered for the pair.
    #[error("Unsupported conversion: {from} → {to}")]
    UnsupportedConversion { from: Format, to: Format },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The converter ran and failed.
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConvertError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Staging the upload or preparing the output path failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Converter panic or task failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RequestError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        RequestError::Io { context, source }
    }

    /// Which bucket of the error taxonomy this belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::InvalidInput(_) | RequestError::PayloadTooLarge { .. } => {
                ErrorKind::InvalidInput
            }
            RequestError::UnsupportedConversion { .. } => ErrorKind::UnsupportedConversion,
            RequestError::Conversion(_) | RequestError::Internal(_) => ErrorKind::ConversionError,
            RequestError::Io { .. } => ErrorKind::IoError,
            RequestError::InvalidConfig(_) => ErrorKind::ConfigError,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RequestError::InvalidInput(_) | RequestError::UnsupportedConversion { .. } => 400,
            RequestError::PayloadTooLarge { .. } => 413,
            RequestError::Io { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                403
            }
            _ => 500,
        }
    }

    /// `true` when the message is safe and useful to show to the caller verbatim.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500 && self.status_code() != 403
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    #[test]
    fn unsupported_display_names_both_formats() {
        let e = RequestError::UnsupportedConversion {
            from: Format::Csv,
            to: Format::Pdf,
        };
        let msg = e.to_string();
        assert!(msg.contains("csv"), "got: {msg}");
        assert!(msg.contains("pdf"), "got: {msg}");
        assert_eq!(e.status_code(), 400);
        assert_eq!(e.kind(), ErrorKind::UnsupportedConversion);
    }

    #[test]
    fn payload_too_large_is_invalid_input_with_413() {
        let e = RequestError::PayloadTooLarge { limit: 5 };
        assert_eq!(e.kind(), ErrorKind::InvalidInput);
        assert_eq!(e.status_code(), 413);
        assert!(e.is_client_error());
    }

    #[test]
    fn permission_denied_maps_to_403() {
        let e = RequestError::io(
            "staging upload",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(e.status_code(), 403);
        assert_eq!(e.kind(), ErrorKind::IoError);
        assert!(!e.is_client_error());
    }

    #[test]
    fn conversion_error_is_500() {
        let e = RequestError::from(ConvertError::EmptyOutput);
        assert_eq!(e.status_code(), 500);
        assert_eq!(e.kind(), ErrorKind::ConversionError);
        assert!(e.to_string().contains("no output"));
    }

    #[test]
    fn invalid_config_has_its_own_kind() {
        let e = ServiceConfig::builder().render_width(10).build().unwrap_err();
        assert!(matches!(e, RequestError::InvalidConfig(_)));
        assert_eq!(e.kind(), ErrorKind::ConfigError);
        assert_ne!(e.kind(), ErrorKind::IoError);
        assert_eq!(e.status_code(), 500);
        assert!(!e.is_client_error());
    }
}
