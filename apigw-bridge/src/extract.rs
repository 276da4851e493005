use crate::error::EventError;
use crate::request::{GatewayEvent, InvocationContext};
use crate::HttpResponse;

use backtrace::Backtrace;

use std::borrow::Cow;

/// Convert an HTTP request/response pair into an API Gateway event and invocation context.
///
/// Not implemented: this always returns [`EventError::NotImplemented`].
pub fn to_event_context<B>(
  request: &http::Request<B>,
  response: &HttpResponse,
) -> Result<(GatewayEvent, InvocationContext), EventError> {
  log::error!(
    "Cannot convert {} {} (status {}) into an API Gateway event",
    request.method(),
    request.uri(),
    response.status()
  );
  Err(EventError::NotImplemented(
    Cow::Borrowed("converting an HTTP request/response pair into an API Gateway event/context"),
    Backtrace::new(),
  ))
}
