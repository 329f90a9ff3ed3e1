pub mod admin_helpers;
pub mod image_host_helpers;
pub mod pagination_helpers;
pub mod pdf_helpers;
pub mod public_helpers;
pub mod reader_helpers;
pub mod sanitization_helpers;
pub mod upload_helpers;
