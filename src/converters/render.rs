//! PDF rasterisation via pdfium: every page to a `DynamicImage`.
//!
//! Called from the blocking pool only. pdfium keeps thread-local state and
//! must never run on an async worker thread.

use crate::error::ConvertError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Library file name pdfium ships under on this platform.
fn platform_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "pdfium.dll"
    } else if cfg!(target_os = "macos") {
        "libpdfium.dylib"
    } else {
        "libpdfium.so"
    }
}

/// Bind to pdfium.
///
/// `library` may name the shared library itself or the directory holding
/// it. Without one, the working directory is tried first and then the
/// system library search path.
pub fn bind(library: Option<&Path>) -> Result<Pdfium, ConvertError> {
    let bindings = match library {
        Some(path) => {
            let path: PathBuf = if path.is_dir() {
                path.join(platform_library_name())
            } else {
                path.to_path_buf()
            };
            debug!("binding pdfium from {}", path.display());
            Pdfium::bind_to_library(&path)
                .map_err(|e| ConvertError::RenderEngine(format!("{}: {e}", path.display())))?
        }
        None => {
            let local = Path::new(".").join(platform_library_name());
            Pdfium::bind_to_library(&local)
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| ConvertError::RenderEngine(e.to_string()))?
        }
    };
    Ok(Pdfium::new(bindings))
}

/// Render every page of `pdf_path` to `width` pixels wide.
///
/// Height is capped at twice the width so a pathological page size cannot
/// blow up memory.
pub fn render_pages(
    pdfium: &Pdfium,
    pdf_path: &Path,
    width: u32,
) -> Result<Vec<DynamicImage>, ConvertError> {
    let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_ascii_lowercase().contains("password") {
            ConvertError::Pdf("document is password-protected".into())
        } else {
            ConvertError::Pdf(detail)
        }
    })?;

    let pages = document.pages();
    info!("PDF loaded for rendering: {} pages", pages.len());

    let render_config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height(width as i32 * 2);

    let mut images = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ConvertError::Rasterisation {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_a_render_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        match bind(Some(&dir.path().join("nope.so"))) {
            Err(ConvertError::RenderEngine(msg)) => assert!(msg.contains("nope.so")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("bound to a library that does not exist"),
        }
    }

    #[test]
    fn directory_is_joined_with_platform_name() {
        let dir = tempfile::tempdir().unwrap();
        match bind(Some(dir.path())) {
            Err(ConvertError::RenderEngine(msg)) => {
                assert!(msg.contains(platform_library_name()), "got: {msg}")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("bound to an empty directory"),
        }
    }
}
