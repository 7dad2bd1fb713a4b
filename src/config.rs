//! Configuration for the conversion service.
//!
//! Everything the request lifecycle needs is carried by [`ServiceConfig`] and
//! handed to [`crate::lifecycle::ConversionService::new`] at construction.
//! Nothing is read from the environment here; the binary maps its flags and
//! env vars onto the builder.

use crate::converters::{Converter, NativeConverter};
use crate::error::RequestError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default upload ceiling: 32 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Configuration for a [`crate::lifecycle::ConversionService`].
///
/// Built via [`ServiceConfig::builder()`] or [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use docshift::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .work_dir("/var/tmp/docshift")
///     .max_upload_bytes(8 * 1024 * 1024)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_upload_bytes, 8 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Directory that holds every staged input and converter output.
    /// Created on service start if missing. Default: `<system tmp>/docshift`.
    pub work_dir: PathBuf,

    /// Largest accepted upload in bytes. Default: 32 MiB.
    pub max_upload_bytes: usize,

    /// Conversions allowed to run at the same time. Default: 4.
    ///
    /// Each conversion holds a blocking-pool thread for its full duration;
    /// requests beyond this limit wait for a slot.
    pub max_concurrent_conversions: usize,

    /// Path to libpdfium (file or directory). If None, `./` and then the
    /// system library search path are tried.
    pub pdfium_library: Option<PathBuf>,

    /// Width in pixels of rendered PDF pages (PDF → PPTX). Range 200–4000.
    /// Default: 1600.
    pub render_width: u32,

    /// Converter implementation. Defaults to [`NativeConverter`].
    pub converter: Option<Arc<dyn Converter>>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("docshift"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_concurrent_conversions: 4,
            pdfium_library: None,
            render_width: 1600,
            converter: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("work_dir", &self.work_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_concurrent_conversions", &self.max_concurrent_conversions)
            .field("pdfium_library", &self.pdfium_library)
            .field("render_width", &self.render_width)
            .field("converter", &self.converter.as_ref().map(|_| "<dyn Converter>"))
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured converter, or the built-in one.
    pub(crate) fn resolve_converter(&self) -> Arc<dyn Converter> {
        match self.converter {
            Some(ref c) => Arc::clone(c),
            None => Arc::new(NativeConverter::new(
                self.pdfium_library.clone(),
                self.render_width,
            )),
        }
    }
}

/// Builder for [`ServiceConfig`].
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn max_concurrent_conversions(mut self, n: usize) -> Self {
        self.config.max_concurrent_conversions = n.max(1);
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn render_width(mut self, px: u32) -> Self {
        self.config.render_width = px;
        self
    }

    pub fn converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.config.converter = Some(converter);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, RequestError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(RequestError::InvalidConfig(
                "max upload size must be ≥ 1 byte".into(),
            ));
        }
        if !(200..=4000).contains(&c.render_width) {
            return Err(RequestError::InvalidConfig(format!(
                "render width must be 200–4000 px, got {}",
                c.render_width
            )));
        }
        if c.work_dir.as_os_str().is_empty() {
            return Err(RequestError::InvalidConfig(
                "working directory must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
