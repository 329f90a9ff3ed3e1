#[macro_use]
mod common;

use comicbase::helper::pdf_helpers::{convert_pdf_to_images_blocking, PdfConversionOptions, PdfError};
use common::{blank_pdf, pdfium_library_path};

fn options(scale: f32) -> PdfConversionOptions {
    PdfConversionOptions { scale, quality: 0.8 }
}

#[test]
fn every_page_becomes_a_jpeg_in_order() {
    let pdf = blank_pdf(3, 120, 200);
    let pages = skip_unless_pdfium!(convert_pdf_to_images_blocking(
        &pdf,
        options(1.0),
        pdfium_library_path().as_deref()
    ))
    .expect("conversion");

    assert_eq!(pages.len(), 3);
    let numbers: Vec<usize> = pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    for page in &pages {
        assert_eq!(&page.jpeg[..2], &[0xFF, 0xD8]);
        assert!(page.height > page.width);
        let decoded = image::load_from_memory(&page.jpeg).expect("decodable jpeg");
        assert_eq!((decoded.width(), decoded.height()), (page.width, page.height));
    }
}

#[test]
fn render_scale_grows_the_output() {
    let pdf = blank_pdf(1, 100, 100);
    let small = skip_unless_pdfium!(convert_pdf_to_images_blocking(
        &pdf,
        options(1.0),
        pdfium_library_path().as_deref()
    ))
    .expect("scale 1");
    let large = convert_pdf_to_images_blocking(&pdf, options(2.0), pdfium_library_path().as_deref()).expect("scale 2");

    assert!(large[0].width > small[0].width);
    assert!(large[0].height > small[0].height);
}

#[test]
fn garbage_bytes_are_an_invalid_pdf() {
    let result = skip_unless_pdfium!(convert_pdf_to_images_blocking(
        b"this is not a pdf",
        options(1.0),
        pdfium_library_path().as_deref()
    ));
    assert!(matches!(result, Err(PdfError::InvalidPdf(_))));
}
