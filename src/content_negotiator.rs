use crate::host::{header_value, Headers};
use log::debug;
use mime::Mime;

/// Media types observed on one exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Negotiation {
    /// Base media type of the request body, if it had one
    pub consumes: Option<String>,
    /// Base media type of the response
    pub produces: Option<String>,
}

/// Parses a Content-Type header value, `None` when it is not a valid media type.
pub fn parse_content_type(content_type: &str) -> Option<Mime> {
    match content_type.parse::<Mime>() {
        Ok(mime) => Some(mime),
        Err(e) => {
            debug!("Ignoring Content-Type {:?}: {}", content_type, e);
            None
        }
    }
}

/// Reduces a Content-Type value to its base media type (the mime essence),
/// dropping parameters such as `charset`.
pub fn media_type(content_type: &str) -> Option<String> {
    parse_content_type(content_type).map(|mime| mime.essence_str().to_string())
}

/// Derives consumed/produced media types from an exchange's headers.
///
/// The request Content-Type only counts when the request carried a body
/// parameter; a Content-Type on a bodiless request says nothing about what the
/// operation consumes.
pub fn negotiate(
    request_headers: &Headers,
    response_headers: &Headers,
    has_body_param: bool,
) -> Negotiation {
    let base = |headers: &Headers| header_value(headers, "content-type").and_then(media_type);

    Negotiation {
        consumes: if has_body_param { base(request_headers) } else { None },
        produces: base(response_headers),
    }
}

/// Adds a media type to an ordered, duplicate-free list.
pub fn accumulate(media_types: &mut Vec<String>, media: String) {
    if !media_types.contains(&media) {
        media_types.push(media);
    }
}
