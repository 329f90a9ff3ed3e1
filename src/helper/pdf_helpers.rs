//! Chapter ingestion from PDF: every page is rasterised through pdfium and
//! re-encoded as a JPEG so it can travel the same upload path as a page image.
//!
//! pdfium is bound per conversion on the blocking pool. A server without the
//! library keeps serving everything else and only PDF uploads fail.

use crate::helper::image_host_helpers::UploadFile;
use actix_web::web;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use log::{debug, info};
use pdfium_render::prelude::*;
use thiserror::Error;

pub const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("PDF support is unavailable on this server: {0}")]
    LibraryUnavailable(String),
    #[error("Failed to convert PDF to images. Please make sure the file is a valid PDF. ({0})")]
    InvalidPdf(String),
    #[error("Failed to render page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },
    #[error("Failed to encode page {page} as JPEG: {detail}")]
    Encode { page: usize, detail: String },
    #[error("Invalid conversion options: {0}")]
    InvalidOptions(String),
    #[error("PDF conversion task failed: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfConversionOptions {
    /// Multiplier applied to the page's natural size.
    pub scale: f32,
    /// JPEG quality in 0.1..=1.0.
    pub quality: f32,
}

impl Default for PdfConversionOptions {
    fn default() -> Self {
        PdfConversionOptions { scale: 2.0, quality: 0.8 }
    }
}

impl PdfConversionOptions {
    pub fn validate(&self) -> Result<(), PdfError> {
        if !(0.1..=1.0).contains(&self.quality) {
            return Err(PdfError::InvalidOptions(format!(
                "quality must be between 0.1 and 1.0, got {}",
                self.quality
            )));
        }
        if !(self.scale > 0.0 && self.scale <= 8.0) {
            return Err(PdfError::InvalidOptions(format!(
                "scale must be greater than 0 and at most 8, got {}",
                self.scale
            )));
        }
        Ok(())
    }

    fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

#[derive(Debug, Clone)]
pub struct PdfPageImage {
    /// 1-based.
    pub page_number: usize,
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// True for `application/pdf` or a name ending in `.pdf`, whichever case.
pub fn is_pdf_file(content_type: Option<&str>, file_name: &str) -> bool {
    content_type.map_or(false, |ct| ct.eq_ignore_ascii_case(PDF_MIME_TYPE))
        || file_name.to_lowercase().ends_with(".pdf")
}

/// `Volume 1.PDF` -> `Volume 1`
pub fn base_name_for(file_name: &str) -> String {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".pdf") {
        file_name[..file_name.len() - 4].to_string()
    } else {
        file_name.to_string()
    }
}

pub fn page_file_name(base_name: &str, page_number: usize) -> String {
    format!("{}_{:03}.jpg", base_name, page_number)
}

/// Wraps rendered pages as upload files named `{base}_{NNN}.jpg`, keeping page order.
pub fn pdf_images_to_files(images: Vec<PdfPageImage>, base_name: &str) -> Vec<UploadFile> {
    images
        .into_iter()
        .map(|page| UploadFile {
            file_name: page_file_name(base_name, page.page_number),
            content_type: "image/jpeg".to_string(),
            bytes: page.jpeg,
        })
        .collect()
}

pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    // JPEG has no alpha channel.
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode_image(&rgb)?;
    Ok(buffer)
}

fn bind_pdfium(library_path: Option<&str>) -> Result<Pdfium, PdfError> {
    let bindings = match library_path {
        Some(path) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| PdfError::LibraryUnavailable(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

pub fn convert_pdf_to_images_blocking(
    bytes: &[u8],
    options: PdfConversionOptions,
    library_path: Option<&str>,
) -> Result<Vec<PdfPageImage>, PdfError> {
    options.validate()?;
    let pdfium = bind_pdfium(library_path)?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| PdfError::InvalidPdf(format!("{:?}", e)))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(PdfError::InvalidPdf("document has no pages".to_string()));
    }
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(options.scale);
    let quality = options.jpeg_quality();
    let mut results = Vec::with_capacity(total_pages);

    for index in 0..total_pages {
        let page_number = index + 1;
        let page = pages
            .get(index as u16)
            .map_err(|e| PdfError::RasterisationFailed { page: page_number, detail: format!("{:?}", e) })?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PdfError::RasterisationFailed { page: page_number, detail: format!("{:?}", e) })?;

        let image = bitmap.as_image();
        let jpeg = encode_jpeg(&image, quality)
            .map_err(|e| PdfError::Encode { page: page_number, detail: e.to_string() })?;

        debug!(
            "Rendered page {} -> {}x{} px, {} bytes",
            page_number,
            image.width(),
            image.height(),
            jpeg.len()
        );

        results.push(PdfPageImage {
            page_number,
            width: image.width(),
            height: image.height(),
            jpeg,
        });
    }

    Ok(results)
}

/// Renders every page of `bytes` off the async workers.
pub async fn convert_pdf_to_images(
    bytes: Vec<u8>,
    options: PdfConversionOptions,
    library_path: Option<String>,
) -> Result<Vec<PdfPageImage>, PdfError> {
    web::block(move || convert_pdf_to_images_blocking(&bytes, options, library_path.as_deref()))
        .await
        .map_err(|e| PdfError::Internal(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbaImage};

    #[test]
    fn pdf_detection_uses_type_or_extension() {
        assert!(is_pdf_file(Some("application/pdf"), "scan"));
        assert!(is_pdf_file(Some("Application/PDF"), "scan.bin"));
        assert!(is_pdf_file(None, "chapter-01.PDF"));
        assert!(is_pdf_file(Some("application/octet-stream"), "chapter.pdf"));
        assert!(!is_pdf_file(Some("image/png"), "page.png"));
        assert!(!is_pdf_file(None, "pdf.png"));
    }

    #[test]
    fn base_name_drops_only_the_pdf_suffix() {
        assert_eq!(base_name_for("Volume 1.PDF"), "Volume 1");
        assert_eq!(base_name_for("chapter.pdf"), "chapter");
        assert_eq!(base_name_for("cover.png"), "cover.png");
    }

    #[test]
    fn rendered_pages_get_padded_names_in_order() {
        let images = (1..=3)
            .map(|n| PdfPageImage { page_number: n, width: 1, height: 1, jpeg: vec![n as u8] })
            .collect();
        let files = pdf_images_to_files(images, "ch1");

        let names: Vec<_> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["ch1_001.jpg", "ch1_002.jpg", "ch1_003.jpg"]);
        assert!(files.iter().all(|f| f.content_type == "image/jpeg"));
        assert_eq!(files[2].bytes, vec![3]);
    }

    #[test]
    fn out_of_range_options_are_rejected() {
        assert!(PdfConversionOptions::default().validate().is_ok());
        assert!(PdfConversionOptions { scale: 2.0, quality: 1.5 }.validate().is_err());
        assert!(PdfConversionOptions { scale: 0.0, quality: 0.8 }.validate().is_err());
    }

    #[test]
    fn invalid_options_fail_before_binding_the_library() {
        let result = convert_pdf_to_images_blocking(
            b"%PDF-1.4",
            PdfConversionOptions { scale: 2.0, quality: 0.0 },
            Some("/nonexistent"),
        );
        assert!(matches!(result, Err(PdfError::InvalidOptions(_))));
    }

    #[test]
    fn missing_library_is_reported_not_panicked() {
        let result = convert_pdf_to_images_blocking(
            b"%PDF-1.4",
            PdfConversionOptions::default(),
            Some("/nonexistent/pdfium-dir"),
        );
        assert!(matches!(result, Err(PdfError::LibraryUnavailable(_))));
    }

    #[test]
    fn jpeg_encoding_flattens_alpha_and_keeps_size() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 4, image::Rgba([200, 10, 10, 128])));
        let jpeg = encode_jpeg(&image, 90).unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (8, 4));
    }
}
