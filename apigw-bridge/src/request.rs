use crate::encoding::to_json;
use crate::error::EventError;
use crate::header::{append_header, HeaderValues, HeaderValuesMap};
use crate::LambdaContext;

use backtrace::Backtrace;
use base64::Engine;
use http::Method;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use std::borrow::Cow;

/// Reserved request header containing the URL-encoded JSON of the inbound event (minus its body).
pub const EVENT_HEADER: &str = "x-apigateway-event";

/// Reserved request header containing the URL-encoded JSON of the invocation context.
pub const CONTEXT_HEADER: &str = "x-apigateway-context";

const CONTENT_LENGTH_HEADER: &str = "Content-Length";

/// Amazon API Gateway (REST API) Lambda proxy integration event.
///
/// Header names keep their original case and order. Any fields not modeled here (e.g.,
/// `requestContext`, `resource`, or `multiValueHeaders`) are retained in
/// [`extra`](GatewayEvent::extra) so that they survive into the [`EVENT_HEADER`] request header.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
  /// HTTP method (e.g., `GET`).
  #[serde(default)]
  pub http_method: String,
  /// Request path, without the query string.
  #[serde(default)]
  pub path: String,
  /// Query string parameters.
  #[serde(default)]
  pub query_string_parameters: Option<IndexMap<String, String>>,
  /// Request headers.
  #[serde(default)]
  pub headers: Option<IndexMap<String, String>>,
  /// Request body, base64-encoded if [`is_base64_encoded`](GatewayEvent::is_base64_encoded).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<String>,
  /// Whether [`body`](GatewayEvent::body) is base64-encoded.
  #[serde(default)]
  pub is_base64_encoded: bool,
  /// Remaining event fields, passed through verbatim.
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Lambda invocation metadata in the shape that Node.js-style handlers expect.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
  /// AWS request ID associated with the invocation.
  pub aws_request_id: String,
  /// Name of the Lambda function.
  pub function_name: String,
  /// Version of the Lambda function.
  pub function_version: String,
  /// ARN used to invoke the function, including any alias or version qualifier.
  pub invoked_function_arn: String,
  /// Memory configured for the function, in megabytes.
  #[serde(rename = "memoryLimitInMB")]
  pub memory_limit_in_mb: i32,
  /// CloudWatch log group for the function.
  pub log_group_name: String,
  /// CloudWatch log stream for the function instance.
  pub log_stream_name: String,
  /// Execution deadline in milliseconds since the Unix epoch.
  pub deadline_ms: u64,
  /// AWS X-Ray trace ID, if tracing is active.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub xray_trace_id: Option<String>,
}

impl From<&LambdaContext> for InvocationContext {
  fn from(context: &LambdaContext) -> Self {
    Self {
      aws_request_id: context.request_id.clone(),
      function_name: context.env_config.function_name.clone(),
      function_version: context.env_config.version.clone(),
      invoked_function_arn: context.invoked_function_arn.clone(),
      memory_limit_in_mb: context.env_config.memory,
      log_group_name: context.env_config.log_group.clone(),
      log_stream_name: context.env_config.log_stream.clone(),
      deadline_ms: context.deadline,
      xray_trace_id: context.xray_trace_id.clone(),
    }
  }
}

/// In-memory stand-in for a server request object, built from an API Gateway event.
#[derive(Clone, Debug)]
pub struct SyntheticRequest {
  /// HTTP method.
  pub method: Method,
  /// Request path including the serialized query string (e.g., `/pets?limit=10`).
  pub path: String,
  /// Same as [`path`](SyntheticRequest::path).
  pub url: String,
  /// Request headers keyed by lower-cased name.
  pub headers: HeaderValuesMap,
  /// Request headers as a flat list alternating between name and value, in original case and
  /// order.
  pub raw_headers: Vec<String>,
  /// Route parameters. Always empty; reserved for a downstream router.
  pub params: IndexMap<String, String>,
  /// Parsed query parameters. Always empty; reserved for downstream parsing.
  pub query: IndexMap<String, String>,
  /// Decoded request body.
  pub body: Option<Vec<u8>>,
}

impl SyntheticRequest {
  /// Build a request from an API Gateway event and its invocation context.
  ///
  /// The event (without its body) and the context are embedded as URL-encoded JSON in the
  /// [`EVENT_HEADER`] and [`CONTEXT_HEADER`] request headers. If the event has a non-empty body and
  /// no `Content-Length` header, one is added containing the length of the decoded body, since
  /// API Gateway doesn't always provide it.
  pub fn build<C>(event: &GatewayEvent, context: &C) -> Result<Self, EventError>
  where
    C: Serialize + ?Sized,
  {
    let method = Method::from_bytes(event.http_method.as_bytes()).map_err(|err| {
      EventError::InvalidMethod(event.http_method.clone(), Box::new(err), Backtrace::new())
    })?;

    let event_without_body = GatewayEvent {
      body: None,
      ..event.clone()
    };

    let mut headers = event.headers.clone().unwrap_or_default();
    // Client-supplied headers may not shadow the reserved ones in any case.
    headers.retain(|name, _| {
      let reserved =
        name.eq_ignore_ascii_case(EVENT_HEADER) || name.eq_ignore_ascii_case(CONTEXT_HEADER);
      if reserved {
        log::warn!("Dropping client-supplied reserved request header `{name}`");
      }
      !reserved
    });
    headers.insert(
      EVENT_HEADER.to_string(),
      encode_reserved_header(EVENT_HEADER, &event_without_body)?,
    );
    headers.insert(
      CONTEXT_HEADER.to_string(),
      encode_reserved_header(CONTEXT_HEADER, context)?,
    );

    let body = event
      .body
      .as_deref()
      .map(|body| decode_body(body, event.is_base64_encoded))
      .transpose()?;

    if let Some(decoded_body) = body.as_ref().filter(|body| !body.is_empty()) {
      let has_content_length = headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case(CONTENT_LENGTH_HEADER));
      if !has_content_length {
        log::trace!(
          "Adding missing {CONTENT_LENGTH_HEADER} header ({} bytes)",
          decoded_body.len()
        );
        headers.insert(
          CONTENT_LENGTH_HEADER.to_string(),
          decoded_body.len().to_string(),
        );
      }
    }

    let path = format_path(&event.path, event.query_string_parameters.as_ref());

    let raw_headers: Vec<String> = headers
      .iter()
      .flat_map(|(name, value)| [name.clone(), value.clone()])
      .collect();

    let mut lower_headers = HeaderValuesMap::with_capacity(headers.len());
    for (name, value) in headers {
      append_header(&mut lower_headers, name.to_ascii_lowercase(), value);
    }

    log::debug!(
      "Built synthetic {method} {path} request with {} headers",
      lower_headers.len()
    );

    Ok(Self {
      method,
      url: path.clone(),
      path,
      headers: lower_headers,
      raw_headers,
      params: IndexMap::new(),
      query: IndexMap::new(),
      body,
    })
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&HeaderValues> {
    self.headers.get(&name.to_ascii_lowercase())
  }

  /// Recover the original event (without its body) from the [`EVENT_HEADER`] request header.
  pub fn apigateway_event(&self) -> Result<GatewayEvent, EventError> {
    self.decode_reserved_header(EVENT_HEADER)
  }

  /// Recover the invocation context from the [`CONTEXT_HEADER`] request header.
  ///
  /// `T` is typically [`InvocationContext`], or [`serde_json::Value`] for an untyped view.
  pub fn apigateway_context<T>(&self) -> Result<T, EventError>
  where
    T: DeserializeOwned,
  {
    self.decode_reserved_header(CONTEXT_HEADER)
  }

  fn decode_reserved_header<T>(&self, name: &'static str) -> Result<T, EventError>
  where
    T: DeserializeOwned,
  {
    let encoded = self
      .header(name)
      .and_then(HeaderValues::as_single)
      .ok_or_else(|| EventError::MissingRequestHeader(Cow::Borrowed(name), Backtrace::new()))?;

    let json = urlencoding::decode(encoded).map_err(|err| {
      EventError::InvalidReservedHeader(Cow::Borrowed(name), Box::new(err), Backtrace::new())
    })?;

    serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_str(&json)).map_err(
      |err| EventError::InvalidReservedHeader(Cow::Borrowed(name), Box::new(err), Backtrace::new()),
    )
  }
}

fn encode_reserved_header<T>(name: &'static str, value: &T) -> Result<String, EventError>
where
  T: Serialize + ?Sized,
{
  to_json(value)
    .map(|json| urlencoding::encode(&json).into_owned())
    .map_err(|err| {
      EventError::InvalidReservedHeader(Cow::Borrowed(name), Box::new(err), Backtrace::new())
    })
}

fn decode_body(body: &str, is_base64_encoded: bool) -> Result<Vec<u8>, EventError> {
  if is_base64_encoded {
    base64::engine::general_purpose::STANDARD
      .decode(body.as_bytes())
      // If this fails, it's an internal error since the base64 encoding is done by API Gateway.
      .map_err(|err| EventError::InvalidBodyBase64(Box::new(err), Backtrace::new()))
  } else {
    Ok(body.as_bytes().to_vec())
  }
}

/// Percent-encode a query string name or value.
///
/// `! * ' ( )` are left as-is in addition to the characters `urlencoding` already leaves
/// unreserved, matching how Node.js servers format the query string of a request URL.
fn encode_query_component(component: &str) -> String {
  const UNESCAPED: [(&str, &str); 5] = [
    ("%21", "!"),
    ("%27", "'"),
    ("%28", "("),
    ("%29", ")"),
    ("%2A", "*"),
  ];

  // Every `%` in the output starts an escape triplet (a literal `%` becomes `%25`), so these
  // replacements can't match across triplet boundaries.
  UNESCAPED
    .iter()
    .fold(urlencoding::encode(component).into_owned(), |encoded, (escaped, raw)| {
      encoded.replace(*escaped, raw)
    })
}

/// Append the percent-encoded query string (if any) to `path`.
fn format_path(path: &str, query_string_parameters: Option<&IndexMap<String, String>>) -> String {
  let query_string = query_string_parameters
    .into_iter()
    .flatten()
    .map(|(name, value)| {
      format!(
        "{}={}",
        encode_query_component(name),
        encode_query_component(value)
      )
    })
    .join("&");

  if query_string.is_empty() {
    path.to_owned()
  } else {
    format!("{path}?{query_string}")
  }
}
