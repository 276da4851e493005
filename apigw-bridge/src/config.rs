/// Configuration shared by every invocation handled by a [`Bridge`](crate::Bridge).
///
/// # Example
///
/// ```rust
/// # use apigw_bridge::BridgeConfig;
/// let config = BridgeConfig::new()
///   .binary_mime_type("image/*")
///   .binary_mime_type("application/octet-stream");
/// assert_eq!(config.get_binary_mime_types().len(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct BridgeConfig {
  binary_mime_types: Vec<String>,
}

impl BridgeConfig {
  /// Create a configuration that emits every response body as text.
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace the set of MIME type patterns whose response bodies are base64-encoded.
  ///
  /// See [`content_type::is_binary`](crate::content_type::is_binary) for the supported pattern
  /// syntax.
  pub fn binary_mime_types<I, S>(mut self, binary_mime_types: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.binary_mime_types = binary_mime_types.into_iter().map(Into::into).collect();
    self
  }

  /// Add one MIME type pattern whose response bodies are base64-encoded.
  pub fn binary_mime_type<S>(mut self, binary_mime_type: S) -> Self
  where
    S: Into<String>,
  {
    self.binary_mime_types.push(binary_mime_type.into());
    self
  }

  /// MIME type patterns whose response bodies are base64-encoded.
  pub fn get_binary_mime_types(&self) -> &[String] {
    &self.binary_mime_types
  }
}
