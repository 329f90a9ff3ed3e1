use std::collections::HashSet;

/// Strips all HTML tags from input (titles, authors, descriptions) and
/// returns plain text. Entities ammonia emits are decoded again; templates
/// escape on output.
pub fn strip_all_html(input: &str) -> String {
    let cleaned = ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string();
    html_escape::decode_html_entities(&cleaned).into_owned()
}

/// Strips markup and surrounding whitespace, then rejects the value if it is
/// empty or longer than `max_chars`.
pub fn clean_text_field(name: &str, input: &str, max_chars: usize) -> Result<String, String> {
    let cleaned = strip_all_html(input.trim()).trim().to_string();
    if cleaned.is_empty() {
        return Err(format!("{} is required.", name));
    }
    if cleaned.chars().count() > max_chars {
        return Err(format!("{} cannot exceed {} characters.", name, max_chars));
    }
    Ok(cleaned)
}

/// Accepts absolute http(s) URLs and site-local `/media/...` paths.
pub fn is_acceptable_image_url(value: &str) -> bool {
    let value = value.trim();
    if value.starts_with("/media/") {
        return !value.contains("..");
    }
    match url::Url::parse(value) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_removed_from_text_fields() {
        assert_eq!(strip_all_html("<b>Bold</b> move<script>x()</script>"), "Bold move");
        assert_eq!(clean_text_field("Title", "  <i>Hi</i> ", 10).unwrap(), "Hi");
    }

    #[test]
    fn plain_text_keeps_ampersands_and_angle_brackets() {
        assert_eq!(strip_all_html("Tom & Jerry"), "Tom & Jerry");
        assert_eq!(strip_all_html("a < b > c"), "a < b > c");
        assert_eq!(clean_text_field("Genre", "Action & Adventure", 50).unwrap(), "Action & Adventure");
        assert_eq!(strip_all_html("<em>Q&amp;A</em>"), "Q&A");
    }

    #[test]
    fn empty_or_long_fields_are_rejected() {
        assert_eq!(clean_text_field("Title", "<p> </p>", 10).unwrap_err(), "Title is required.");
        assert!(clean_text_field("Author", "abcdef", 5).is_err());
    }

    #[test]
    fn image_urls_must_be_web_or_media() {
        assert!(is_acceptable_image_url("https://i.ibb.co/x/page.jpg"));
        assert!(is_acceptable_image_url("/media/pages/ab/cd/x.jpg"));
        assert!(!is_acceptable_image_url("/media/../etc/passwd"));
        assert!(!is_acceptable_image_url("javascript:alert(1)"));
        assert!(!is_acceptable_image_url("page.jpg"));
    }
}
