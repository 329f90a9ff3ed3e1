/// Builds a valid PDF with `pages` blank pages of `width` x `height` points.
pub fn blank_pdf(pages: usize, width: u32, height: u32) -> Vec<u8> {
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", i + 3)).collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages),
    ];
    for _ in 0..pages {
        objects.push(format!("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] >>", width, height));
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, object).as_bytes());
    }

    let xref_offset = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    pdf
}

/// pdfium location for tests: `PDFIUM_LIBRARY_PATH` when set, else the system library.
pub fn pdfium_library_path() -> Option<String> {
    std::env::var("PDFIUM_LIBRARY_PATH").ok().filter(|p| !p.trim().is_empty())
}

/// Returns early from the test when pdfium cannot be bound on this machine.
macro_rules! skip_unless_pdfium {
    ($result:expr) => {
        match $result {
            Err(comicbase::helper::pdf_helpers::PdfError::LibraryUnavailable(detail)) => {
                println!("SKIP — pdfium is not available: {}", detail);
                println!("       Set PDFIUM_LIBRARY_PATH to the directory holding the library.");
                return;
            }
            other => other,
        }
    };
}
