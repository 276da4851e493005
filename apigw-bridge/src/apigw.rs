use crate::content_type;
use crate::error::EventError;
use crate::header::{find_header, HeaderValues};
use crate::response::{SyntheticResponse, DEFAULT_STATUS_CODE};
use crate::{Body, HttpResponse};

use aws_lambda_events::apigw::ApiGatewayProxyResponse;
use aws_lambda_events::http::{HeaderMap, HeaderName, HeaderValue};
use backtrace::Backtrace;
use base64::Engine;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Response returned to Amazon API Gateway from a Lambda proxy integration.
///
/// Each header name appears in at most one of [`headers`](GatewayResponse::headers) and
/// [`multi_value_headers`](GatewayResponse::multi_value_headers).
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
  /// HTTP status code.
  pub status_code: u16,
  /// Response body. Base64-encoded if [`is_base64_encoded`](GatewayResponse::is_base64_encoded).
  pub body: String,
  /// Whether [`body`](GatewayResponse::body) is base64-encoded.
  pub is_base64_encoded: bool,
  /// Headers that were set exactly once.
  pub headers: IndexMap<String, String>,
  /// Headers that were set more than once.
  pub multi_value_headers: IndexMap<String, Vec<String>>,
}

/// Serialize a [`SyntheticResponse`] as a [`GatewayResponse`].
///
/// Callers should wait for [`SyntheticResponse::ended`] first; otherwise the payload may be
/// missing. `Transfer-Encoding: chunked` headers are dropped since API Gateway doesn't support
/// chunked responses. The body is base64-encoded if the response `Content-Type` matches one of the
/// `binary_mime_types` patterns (see [`content_type::is_binary`]).
pub fn to_apigw_response<S>(response: &SyntheticResponse, binary_mime_types: &[S]) -> GatewayResponse
where
  S: AsRef<str>,
{
  response.with_state(|state| {
    if !state.ended {
      log::warn!("Serializing a response that has not ended; the payload may be incomplete");
    }

    let mut headers = IndexMap::new();
    let mut multi_value_headers = IndexMap::new();
    for (name, value) in &state.headers {
      match value {
        HeaderValues::Single(value) if is_chunked_transfer_encoding(name, value) => {
          log::trace!("Dropping unsupported `{name}: {value}` response header");
        }
        HeaderValues::Single(value) => {
          headers.insert(name.clone(), value.clone());
        }
        HeaderValues::Multi(values) => {
          multi_value_headers.insert(name.clone(), values.clone());
        }
      }
    }

    let mime_type = content_type::normalize(
      find_header(&state.headers, "content-type").and_then(HeaderValues::as_single),
    );
    let is_base64_encoded = content_type::is_binary(mime_type, binary_mime_types);

    let payload = state.payload.as_deref().unwrap_or_default();
    let body = if is_base64_encoded {
      base64::engine::general_purpose::STANDARD.encode(payload)
    } else {
      String::from_utf8_lossy(payload).into_owned()
    };

    let status_code = state.status_code.unwrap_or(DEFAULT_STATUS_CODE);
    log::debug!(
      "Serialized {status_code} response ({} body bytes, base64: {is_base64_encoded})",
      payload.len()
    );

    GatewayResponse {
      status_code,
      body,
      is_base64_encoded,
      headers,
      multi_value_headers,
    }
  })
}

fn is_chunked_transfer_encoding(name: &str, value: &str) -> bool {
  name.eq_ignore_ascii_case("transfer-encoding") && value.trim().eq_ignore_ascii_case("chunked")
}

impl GatewayResponse {
  /// Convert into the [`aws_lambda_events`] representation of an API Gateway proxy response.
  ///
  /// Fails if any header name or value is not valid HTTP.
  pub fn into_apigw(self) -> Result<ApiGatewayProxyResponse, EventError> {
    let mut headers = HeaderMap::with_capacity(self.headers.len());
    for (name, value) in &self.headers {
      headers.insert(parse_header_name(name)?, parse_header_value(name, value)?);
    }

    let mut multi_value_headers = HeaderMap::with_capacity(self.multi_value_headers.len());
    for (name, values) in &self.multi_value_headers {
      let header_name = parse_header_name(name)?;
      for value in values {
        multi_value_headers.append(header_name.clone(), parse_header_value(name, value)?);
      }
    }

    Ok(ApiGatewayProxyResponse {
      status_code: i64::from(self.status_code),
      headers,
      multi_value_headers,
      body: Some(Body::Text(self.body)),
      is_base64_encoded: self.is_base64_encoded,
    })
  }
}

impl From<HttpResponse> for GatewayResponse {
  /// Serialize an [`HttpResponse`] (e.g., one built from an [`EventError`]) as a
  /// [`GatewayResponse`].
  fn from(response: HttpResponse) -> Self {
    let (parts, body) = response.into_parts();

    let mut headers = IndexMap::new();
    let mut multi_value_headers = IndexMap::new();
    for name in parts.headers.keys() {
      let mut values = parts
        .headers
        .get_all(name)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect::<Vec<_>>();
      if values.len() == 1 {
        headers.insert(name.as_str().to_owned(), values.remove(0));
      } else {
        multi_value_headers.insert(name.as_str().to_owned(), values);
      }
    }

    let (body, is_base64_encoded) = match body {
      Body::Empty => (String::new(), false),
      Body::Text(text) => (text, false),
      Body::Binary(bytes) => (
        base64::engine::general_purpose::STANDARD.encode(bytes),
        true,
      ),
    };

    GatewayResponse {
      status_code: parts.status.as_u16(),
      body,
      is_base64_encoded,
      headers,
      multi_value_headers,
    }
  }
}

fn parse_header_name(name: &str) -> Result<HeaderName, EventError> {
  HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
    EventError::InvalidResponseHeader(name.to_owned(), Box::new(err), Backtrace::new())
  })
}

fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, EventError> {
  HeaderValue::from_str(value).map_err(|err| {
    EventError::InvalidResponseHeader(name.to_owned(), Box::new(err), Backtrace::new())
  })
}

#[cfg(test)]
mod tests {
  use crate::apigw::{to_apigw_response, GatewayResponse};
  use crate::error::EventError;
  use crate::response::SyntheticResponse;
  use crate::{Body, HttpResponse, StatusCode};

  use indexmap::IndexMap;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  const NO_PATTERNS: [&str; 0] = [];

  #[test]
  fn test_defaults() {
    let response = SyntheticResponse::new();
    response.end(Vec::<u8>::new());

    assert_eq!(
      to_apigw_response(&response, &NO_PATTERNS),
      GatewayResponse {
        status_code: 200,
        body: String::new(),
        is_base64_encoded: false,
        headers: IndexMap::new(),
        multi_value_headers: IndexMap::new(),
      }
    );
  }

  #[test]
  fn test_open_response_has_empty_body() {
    let response = SyntheticResponse::new();
    response.set_status_code(204);

    let apigw = to_apigw_response(&response, &NO_PATTERNS);
    assert_eq!(apigw.status_code, 204);
    assert_eq!(apigw.body, "");
  }

  #[test]
  fn test_chunked_transfer_encoding_dropped() {
    let response = SyntheticResponse::new();
    response.set_header("transfer-encoding", "chunked");
    response.set_header("content-type", "text/plain");
    response.end("hello");

    let apigw = to_apigw_response(&response, &NO_PATTERNS);
    assert_eq!(apigw.headers.get("content-type").unwrap(), "text/plain");
    assert!(!apigw.headers.contains_key("transfer-encoding"));
    assert!(!apigw.multi_value_headers.contains_key("transfer-encoding"));
    assert_eq!(apigw.body, "hello");

    let response = SyntheticResponse::new();
    response.set_header("Transfer-Encoding", "Chunked");
    response.end("");
    assert!(to_apigw_response(&response, &NO_PATTERNS)
      .headers
      .is_empty());

    // Other transfer encodings pass through.
    let response = SyntheticResponse::new();
    response.set_header("transfer-encoding", "gzip");
    response.end("");
    assert_eq!(
      to_apigw_response(&response, &NO_PATTERNS).headers["transfer-encoding"],
      "gzip"
    );
  }

  #[test]
  fn test_multi_value_headers() {
    let response = SyntheticResponse::new();
    response.set_header("set-cookie", "a=1");
    response.set_header("x-single", "yes");
    response.set_header("set-cookie", "b=2");
    response.end("");

    let apigw = to_apigw_response(&response, &NO_PATTERNS);
    assert_eq!(
      apigw.multi_value_headers.get("set-cookie"),
      Some(&vec!["a=1".to_string(), "b=2".to_string()])
    );
    assert!(!apigw.headers.contains_key("set-cookie"));
    assert_eq!(apigw.headers.get("x-single").map(String::as_str), Some("yes"));
    assert!(!apigw.multi_value_headers.contains_key("x-single"));
  }

  #[test]
  fn test_text_body_ignores_binary_content_without_patterns() {
    let response = SyntheticResponse::new();
    response.set_header("content-type", "image/png");
    response.end(vec![0x68u8, 0x69, 0xff]);

    let apigw = to_apigw_response(&response, &NO_PATTERNS);
    assert!(!apigw.is_base64_encoded);
    assert_eq!(apigw.body, "hi\u{fffd}");
  }

  #[test]
  fn test_binary_body_base64() {
    let response = SyntheticResponse::new();
    response.set_header("Content-Type", "image/png; charset=binary");
    response.end(vec![0u8, 1, 2, 3, 4]);

    let apigw = to_apigw_response(&response, &["image/*"]);
    assert!(apigw.is_base64_encoded);
    assert_eq!(apigw.body, "AAECAwQ=");

    let apigw = to_apigw_response(&response, &["application/octet-stream"]);
    assert!(!apigw.is_base64_encoded);
  }

  #[test]
  fn test_serialize_wire_format() {
    let response = SyntheticResponse::new();
    response.set_status_code(201);
    response.set_header("content-type", "application/json");
    response.set_header("set-cookie", "a=1");
    response.set_header("set-cookie", "b=2");
    response.end(r#"{"ok":true}"#);

    assert_eq!(
      serde_json::to_value(to_apigw_response(&response, &NO_PATTERNS)).unwrap(),
      json!({
        "statusCode": 201,
        "body": "{\"ok\":true}",
        "isBase64Encoded": false,
        "headers": { "content-type": "application/json" },
        "multiValueHeaders": { "set-cookie": ["a=1", "b=2"] },
      })
    );
  }

  #[test]
  fn test_into_apigw() {
    let response = SyntheticResponse::new();
    response.set_status_code(202);
    response.set_header("Content-Type", "text/plain");
    response.set_header("set-cookie", "a=1");
    response.set_header("set-cookie", "b=2");
    response.end("accepted");

    let apigw = to_apigw_response(&response, &NO_PATTERNS)
      .into_apigw()
      .unwrap();
    assert_eq!(apigw.status_code, 202);
    assert_eq!(apigw.headers.get("content-type").unwrap(), "text/plain");
    assert_eq!(
      apigw
        .multi_value_headers
        .get_all("set-cookie")
        .iter()
        .collect::<Vec<_>>(),
      vec!["a=1", "b=2"]
    );
    assert_eq!(apigw.body, Some(Body::Text("accepted".to_string())));
    assert!(!apigw.is_base64_encoded);
  }

  #[test]
  fn test_into_apigw_invalid_header() {
    let response = SyntheticResponse::new();
    response.set_header("bad header", "value");
    response.end("");

    match to_apigw_response(&response, &NO_PATTERNS).into_apigw() {
      Err(EventError::InvalidResponseHeader(name, _, _)) => assert_eq!(name, "bad header"),
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[test]
  fn test_from_http_response() {
    let mut response = HttpResponse::new(Body::Binary(vec![0, 1, 2, 3, 4]));
    *response.status_mut() = StatusCode::IM_A_TEAPOT;
    response
      .headers_mut()
      .insert("content-type", "image/png".parse().unwrap());
    response
      .headers_mut()
      .append("set-cookie", "a=1".parse().unwrap());
    response
      .headers_mut()
      .append("set-cookie", "b=2".parse().unwrap());

    let apigw = GatewayResponse::from(response);
    assert_eq!(apigw.status_code, 418);
    assert_eq!(apigw.body, "AAECAwQ=");
    assert!(apigw.is_base64_encoded);
    assert_eq!(apigw.headers["content-type"], "image/png");
    assert_eq!(apigw.multi_value_headers["set-cookie"], vec!["a=1", "b=2"]);
  }
}
