use mime::Mime;

/// Return the MIME type portion of a `Content-Type` header value, ignoring any parameters such as
/// `charset`.
///
/// Returns an empty string if no header was supplied. The result is not validated.
pub fn normalize(content_type_header: Option<&str>) -> &str {
  content_type_header
    .map(|header| header.split(';').next().unwrap_or(""))
    .unwrap_or("")
}

/// Determine whether a response with the given MIME type should be base64-encoded.
///
/// An empty `binary_mime_types` set means every body is treated as text. Otherwise, the MIME type
/// must parse and match at least one pattern. Supported patterns are `type/subtype`, `type/*`,
/// `*/*`, `*/subtype`, suffix wildcards such as `*/*+json` (or the shorthand `+json`), and the
/// shorthands `urlencoded` and `multipart`. Matching is case-insensitive. Malformed MIME types or
/// patterns never match.
pub fn is_binary<S>(mime_type: &str, binary_mime_types: &[S]) -> bool
where
  S: AsRef<str>,
{
  if binary_mime_types.is_empty() {
    return false;
  }

  let Ok(mime) = mime_type.trim().to_ascii_lowercase().parse::<Mime>() else {
    log::trace!("Treating unparseable MIME type `{mime_type}` as text");
    return false;
  };

  binary_mime_types.iter().any(|pattern| {
    MimePattern::parse(pattern.as_ref()).is_some_and(|pattern| pattern.matches(&mime))
  })
}

/// Binary MIME type pattern, with `*` standing for any type or subtype.
#[derive(Debug, PartialEq)]
struct MimePattern(Mime);

impl MimePattern {
  fn parse(pattern: &str) -> Option<Self> {
    let pattern = pattern.trim().to_ascii_lowercase();
    let expanded = match pattern.as_str() {
      "urlencoded" => "application/x-www-form-urlencoded".to_string(),
      "multipart" => "multipart/*".to_string(),
      suffix if suffix.starts_with('+') => format!("*/*{suffix}"),
      _ => pattern,
    };

    match expanded.parse::<Mime>() {
      Ok(mime) => Some(Self(mime)),
      Err(err) => {
        log::trace!("Ignoring invalid binary MIME type pattern `{expanded}`: {err}");
        None
      }
    }
  }

  fn matches(&self, actual: &Mime) -> bool {
    let pattern = &self.0;
    if pattern.type_() != mime::STAR && pattern.type_() != actual.type_() {
      return false;
    }

    let subtype_matches =
      pattern.subtype() == mime::STAR || pattern.subtype() == actual.subtype();
    match pattern.suffix() {
      // `type/*` matches every subtype, suffixed or not.
      None if pattern.subtype() == mime::STAR => true,
      None => subtype_matches && actual.suffix().is_none(),
      Some(suffix) => subtype_matches && actual.suffix() == Some(suffix),
    }
  }
}
