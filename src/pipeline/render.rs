//! First-page rasterisation: document bytes → PNG preview via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with process-global state and no async story.
//! [`rasterize`] moves the work onto Tokio's blocking pool so a slow page
//! cannot stall the runtime's worker threads, and a process-wide mutex keeps
//! two rasterisations from entering the library at the same time.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary: a US-letter résumé and an A3 portfolio sheet would give
//! very different images at a fixed DPI. `max_rendered_pixels` fixes the
//! longer edge instead, which keeps previews a predictable size and lands in
//! the range vision models read well.
//!
//! ## Decode vs Render
//!
//! Anything wrong with the *bytes* (empty, not a PDF, unparseable, locked,
//! no pages) is [`ReviewError::Decode`]. A document that opened but whose
//! page could not be drawn or encoded is [`ReviewError::Render`].

use crate::config::PipelineConfig;
use crate::error::ReviewError;
use crate::pipeline::encode::encode_png;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// How far into the file the `%PDF` marker may appear.
const MAGIC_WINDOW: usize = 1024;

static PDFIUM_LOCK: Mutex<()> = Mutex::new(());

/// The first page of a document rendered as PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterOutput {
    pub width: u32,
    pub height: u32,
    /// Zero-based source page. Always 0 for previews.
    pub page_index: usize,
    /// Upload name derived from the source file name.
    pub filename: String,
    /// Encoded PNG bytes.
    pub png: Vec<u8>,
}

impl RasterOutput {
    pub fn byte_len(&self) -> usize {
        self.png.len()
    }
}

/// Turns document bytes into a first-page preview.
///
/// Implementations are synchronous and CPU-bound; must return the same
/// output for the same input.
pub trait Rasterizer: Send + Sync {
    fn rasterize_first_page(
        &self,
        bytes: &[u8],
        source_name: &str,
    ) -> Result<RasterOutput, ReviewError>;
}

/// Run a rasterizer on the blocking pool.
pub async fn rasterize(
    rasterizer: Arc<dyn Rasterizer>,
    bytes: Vec<u8>,
    source_name: String,
) -> Result<RasterOutput, ReviewError> {
    tokio::task::spawn_blocking(move || rasterizer.rasterize_first_page(&bytes, &source_name))
        .await
        .map_err(|e| ReviewError::Render {
            detail: format!("render task failed: {}", e),
        })?
}

/// Preview name for a source file: its stem plus `.png`.
///
/// `"cv.pdf"` → `"cv.png"`, `"uploads/Jane Doe.pdf"` → `"Jane Doe.png"`.
pub fn preview_filename(source_name: &str) -> String {
    let stem = Path::new(source_name.trim())
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .unwrap_or("");
    if stem.is_empty() {
        "document.png".to_string()
    } else {
        format!("{stem}.png")
    }
}

/// Cheap checks that run before pdfium is involved.
pub fn check_document_bytes(bytes: &[u8]) -> Result<(), ReviewError> {
    if bytes.is_empty() {
        return Err(ReviewError::Decode {
            detail: "document is empty (0 bytes)".to_string(),
        });
    }
    let window = &bytes[..bytes.len().min(MAGIC_WINDOW)];
    if !window.windows(4).any(|w| w == b"%PDF") {
        let shown = &bytes[..bytes.len().min(4)];
        return Err(ReviewError::Decode {
            detail: format!("not a PDF (starts with {:02x?})", shown),
        });
    }
    Ok(())
}

/// [`Rasterizer`] backed by the pdfium library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_pixels: u32,
    library: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(max_pixels: u32) -> Self {
        Self {
            max_pixels,
            library: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_pixels: config.max_rendered_pixels,
            library: config.pdfium_library.clone(),
        }
    }

    /// Use this library file (or directory holding it) instead of searching.
    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library = Some(path.into());
        self
    }

    pub fn max_pixels(&self) -> u32 {
        self.max_pixels
    }

    /// Whether a pdfium library can be bound with the current settings.
    pub fn is_available(&self) -> bool {
        let _guard = PDFIUM_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        self.bind().is_ok()
    }

    /// Bind order: explicit library, `PDFIUM_LIB_PATH`, system library.
    fn bind(&self) -> Result<Pdfium, ReviewError> {
        let explicit = self
            .library
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => {
                let lib = if path.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    path
                };
                debug!("Binding pdfium from {}", lib.display());
                Pdfium::bind_to_library(&lib).map_err(|e| {
                    ReviewError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
                })?
            }
            None => Pdfium::bind_to_system_library()
                .map_err(|e| ReviewError::PdfiumBindingFailed(format!("{:?}", e)))?,
        };
        Ok(Pdfium::new(bindings))
    }
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_RENDERED_PIXELS)
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize_first_page(
        &self,
        bytes: &[u8],
        source_name: &str,
    ) -> Result<RasterOutput, ReviewError> {
        check_document_bytes(bytes)?;

        let _guard = PDFIUM_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let pdfium = self.bind()?;

        let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
            let err_str = format!("{:?}", e);
            let detail = if err_str.to_lowercase().contains("password") {
                "document is password-protected".to_string()
            } else {
                err_str
            };
            ReviewError::Decode { detail }
        })?;

        let pages = document.pages();
        if pages.len() == 0 {
            return Err(ReviewError::Decode {
                detail: "document has no pages".to_string(),
            });
        }
        info!("Document loaded: {} pages, rendering page 1", pages.len());

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let page = pages.get(0).map_err(|e| ReviewError::Render {
            detail: format!("page 1: {:?}", e),
        })?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ReviewError::Render {
                detail: format!("page 1: {:?}", e),
            })?;
        let image = bitmap.as_image();
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(ReviewError::Render {
                detail: format!("page 1 rendered to an empty {width}x{height} bitmap"),
            });
        }

        let png = encode_png(&image).map_err(|e| ReviewError::Render {
            detail: format!("PNG encoding failed: {}", e),
        })?;
        debug!("Rendered page 1 → {}x{} px, {} bytes", width, height, png.len());

        Ok(RasterOutput {
            width,
            height,
            page_index: 0,
            filename: preview_filename(source_name),
            png,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_filename_uses_stem() {
        assert_eq!(preview_filename("cv.pdf"), "cv.png");
        assert_eq!(preview_filename("uploads/Jane Doe.pdf"), "Jane Doe.png");
        assert_eq!(preview_filename("report.final.pdf"), "report.final.png");
        assert_eq!(preview_filename("noext"), "noext.png");
        assert_eq!(preview_filename(""), "document.png");
    }

    #[test]
    fn empty_bytes_are_decode_errors() {
        let err = PdfiumRasterizer::default()
            .rasterize_first_page(&[], "cv.pdf")
            .unwrap_err();
        assert!(matches!(err, ReviewError::Decode { .. }), "got {err:?}");
    }

    #[test]
    fn non_pdf_bytes_are_decode_errors() {
        let err = PdfiumRasterizer::default()
            .rasterize_first_page(b"PK\x03\x04 zip archive", "cv.docx")
            .unwrap_err();
        match err {
            ReviewError::Decode { detail } => assert!(detail.contains("not a PDF")),
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn marker_after_leading_junk_is_accepted() {
        let mut bytes = vec![b' '; 16];
        bytes.extend_from_slice(b"%PDF-1.7\n");
        assert!(check_document_bytes(&bytes).is_ok());

        let mut late = vec![b' '; MAGIC_WINDOW];
        late.extend_from_slice(b"%PDF-1.7\n");
        assert!(check_document_bytes(&late).is_err());
    }

    #[tokio::test]
    async fn rasterize_runs_on_blocking_pool() {
        struct Fixed;
        impl Rasterizer for Fixed {
            fn rasterize_first_page(
                &self,
                bytes: &[u8],
                source_name: &str,
            ) -> Result<RasterOutput, ReviewError> {
                Ok(RasterOutput {
                    width: 2,
                    height: 3,
                    page_index: 0,
                    filename: preview_filename(source_name),
                    png: bytes.to_vec(),
                })
            }
        }

        let out = rasterize(Arc::new(Fixed), vec![1, 2, 3], "a.pdf".into())
            .await
            .unwrap();
        assert_eq!(out.filename, "a.png");
        assert_eq!(out.byte_len(), 3);
    }

    #[tokio::test]
    async fn panicking_rasterizer_is_render_error() {
        struct Crashing;
        impl Rasterizer for Crashing {
            fn rasterize_first_page(
                &self,
                _bytes: &[u8],
                _source_name: &str,
            ) -> Result<RasterOutput, ReviewError> {
                panic!("bitmap allocation failed");
            }
        }

        let err = rasterize(Arc::new(Crashing), b"%PDF-1.4".to_vec(), "cv.pdf".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Render { .. }), "got {err:?}");
    }

    #[test]
    fn max_pixels_follows_config() {
        let config = PipelineConfig::builder()
            .max_rendered_pixels(1200)
            .build()
            .unwrap();
        assert_eq!(PdfiumRasterizer::from_config(&config).max_pixels(), 1200);
        assert_eq!(PdfiumRasterizer::default().max_pixels(), 2000);
    }
}
