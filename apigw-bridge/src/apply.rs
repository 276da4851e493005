use crate::encoding::to_json;
use crate::error::EventError;
use crate::{Body, HttpResponse, StatusCode};

use backtrace::Backtrace;
use headers::{ContentType, Header};
use http::{HeaderName, HeaderValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use std::borrow::Cow;

/// Generic handler result describing an HTTP response with a JSON body.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct HandlerResult {
  /// HTTP status code.
  pub status: u16,
  /// JSON-encoded response body.
  pub body: String,
  /// Response headers.
  #[serde(default)]
  pub headers: IndexMap<String, String>,
}

/// Server response object that a [`HandlerResult`] can be applied to.
pub trait ServerResponse {
  /// Set the HTTP status code.
  fn status(&mut self, status_code: u16) -> Result<(), EventError>;

  /// Write `value` as the JSON response body.
  fn json(&mut self, value: &serde_json::Value) -> Result<(), EventError>;

  /// Append a header value, keeping any values already set for `name`.
  fn append(&mut self, name: &str, value: &str) -> Result<(), EventError>;
}

/// Apply a [`HandlerResult`] to a server response: status code, then JSON body, then headers.
///
/// Fails with [`EventError::InvalidBodyJson`] if `result.body` is not valid JSON. Only JSON
/// bodies are supported.
pub fn apply_result<R>(result: &HandlerResult, target: &mut R) -> Result<(), EventError>
where
  R: ServerResponse + ?Sized,
{
  target.status(result.status)?;

  let body = serde_path_to_error::deserialize::<_, serde_json::Value>(
    &mut serde_json::Deserializer::from_str(&result.body),
  )
  .map_err(|err| EventError::InvalidBodyJson(Box::new(err), Backtrace::new()))?;
  target.json(&body)?;

  for (name, value) in &result.headers {
    target.append(name, value)?;
  }

  log::trace!(
    "Applied {} result with {} headers",
    result.status,
    result.headers.len()
  );

  Ok(())
}

impl ServerResponse for HttpResponse {
  fn status(&mut self, status_code: u16) -> Result<(), EventError> {
    *self.status_mut() = StatusCode::from_u16(status_code).map_err(|err| {
      EventError::InvalidStatusCode(status_code, Box::new(err), Backtrace::new())
    })?;
    Ok(())
  }

  fn json(&mut self, value: &serde_json::Value) -> Result<(), EventError> {
    let json = to_json(value).map_err(|err| EventError::ToJsonResponse {
      type_name: Cow::Borrowed("serde_json::Value"),
      source: Box::new(err),
      backtrace: Backtrace::new(),
    })?;

    self.headers_mut().insert(
      ContentType::name().to_owned(),
      ContentType::json()
        .to_string()
        .try_into()
        .expect("MIME type should be a valid header"),
    );
    *self.body_mut() = Body::Text(json);
    Ok(())
  }

  fn append(&mut self, name: &str, value: &str) -> Result<(), EventError> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
      EventError::InvalidResponseHeader(name.to_owned(), Box::new(err), Backtrace::new())
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|err| {
      EventError::InvalidResponseHeader(name.to_owned(), Box::new(err), Backtrace::new())
    })?;
    self.headers_mut().append(header_name, header_value);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use crate::apply::{apply_result, HandlerResult, ServerResponse};
  use crate::error::EventError;
  use crate::{Body, HttpResponse};

  use indexmap::IndexMap;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  /// Records every call made through the [`ServerResponse`] contract.
  #[derive(Debug, Default)]
  struct RecordingResponse {
    status: Option<u16>,
    json: Option<serde_json::Value>,
    appended: Vec<(String, String)>,
  }

  impl ServerResponse for RecordingResponse {
    fn status(&mut self, status_code: u16) -> Result<(), EventError> {
      self.status = Some(status_code);
      Ok(())
    }

    fn json(&mut self, value: &serde_json::Value) -> Result<(), EventError> {
      self.json = Some(value.clone());
      Ok(())
    }

    fn append(&mut self, name: &str, value: &str) -> Result<(), EventError> {
      self.appended.push((name.to_owned(), value.to_owned()));
      Ok(())
    }
  }

  fn mock_result() -> HandlerResult {
    HandlerResult {
      status: 201,
      body: r#"{"ok":true}"#.to_string(),
      headers: IndexMap::from([("x-a".to_string(), "1".to_string())]),
    }
  }

  #[test]
  fn test_apply_to_recording_response() {
    let mut target = RecordingResponse::default();
    apply_result(&mock_result(), &mut target).unwrap();

    assert_eq!(target.status, Some(201));
    assert_eq!(target.json, Some(json!({ "ok": true })));
    assert_eq!(target.appended, vec![("x-a".to_string(), "1".to_string())]);
  }

  #[test]
  fn test_apply_to_http_response() {
    let mut target = HttpResponse::new(Body::Empty);
    target
      .headers_mut()
      .insert("x-a", "0".parse().unwrap());

    apply_result(&mock_result(), &mut target).unwrap();

    assert_eq!(target.status().as_u16(), 201);
    assert_eq!(target.body(), &Body::Text(r#"{"ok":true}"#.to_string()));
    assert_eq!(
      target.headers().get("content-type").unwrap(),
      "application/json"
    );
    assert_eq!(
      target
        .headers()
        .get_all("x-a")
        .iter()
        .collect::<Vec<_>>(),
      vec!["0", "1"]
    );
  }

  #[test]
  fn test_invalid_json_body() {
    let result = HandlerResult {
      body: "<html></html>".to_string(),
      ..mock_result()
    };
    let mut target = RecordingResponse::default();

    match apply_result(&result, &mut target) {
      Err(EventError::InvalidBodyJson(_, _)) => {}
      other => panic!("unexpected result: {other:?}"),
    }
    // Status is applied before the body is parsed.
    assert_eq!(target.status, Some(201));
    assert_eq!(target.json, None);
    assert!(target.appended.is_empty());
  }

  #[test]
  fn test_invalid_status_and_header() {
    let mut target = HttpResponse::new(Body::Empty);
    match ServerResponse::status(&mut target, 1000) {
      Err(EventError::InvalidStatusCode(1000, _, _)) => {}
      other => panic!("unexpected result: {other:?}"),
    }
    match target.append("x-a", "line\nbreak") {
      Err(EventError::InvalidResponseHeader(name, _, _)) => assert_eq!(name, "x-a"),
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[test]
  fn test_deserialize_result() {
    let result = serde_json::from_value::<HandlerResult>(json!({
      "status": 404,
      "body": "null",
    }))
    .unwrap();
    assert_eq!(result.status, 404);
    assert!(result.headers.is_empty());
  }
}
