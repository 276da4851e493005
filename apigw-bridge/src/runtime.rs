use crate::apigw::{to_apigw_response, GatewayResponse};
use crate::config::BridgeConfig;
use crate::error::{format_error, EventError};
use crate::request::{GatewayEvent, InvocationContext, SyntheticRequest};
use crate::response::SyntheticResponse;
use crate::HttpResponse;

use async_trait::async_trait;
use backtrace::Backtrace;
use futures::FutureExt;
use lambda_runtime::{service_fn, LambdaEvent};
use serde::Serialize;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Server-style request handler.
///
/// The handler reads the [`SyntheticRequest`] and writes its response through the
/// [`SyntheticResponse`], finishing with [`SyntheticResponse::end`]. It may hand the response off
/// to another task and return before the response has ended; the [`Bridge`] waits for
/// [`end`](SyntheticResponse::end) either way.
///
/// This trait is implemented for any `Fn(SyntheticRequest, SyntheticResponse) -> Future`, so a
/// plain async closure works as a handler.
#[async_trait]
pub trait ServerHandler: Send + Sync {
  /// Handle a single request.
  async fn handle(&self, request: SyntheticRequest, response: SyntheticResponse);
}

#[async_trait]
impl<F, Fut> ServerHandler for F
where
  F: Fn(SyntheticRequest, SyntheticResponse) -> Fut + Send + Sync,
  Fut: Future<Output = ()> + Send + 'static,
{
  async fn handle(&self, request: SyntheticRequest, response: SyntheticResponse) {
    self(request, response).await
  }
}

/// Serves API Gateway events with a [`ServerHandler`].
pub struct Bridge<H> {
  handler: H,
  config: BridgeConfig,
}

impl<H> Bridge<H>
where
  H: ServerHandler,
{
  /// Create a bridge that dispatches every event to `handler`.
  pub fn new(handler: H, config: BridgeConfig) -> Self {
    Self { handler, config }
  }

  /// Handle a Lambda invocation.
  pub async fn handle_event(&self, event: LambdaEvent<GatewayEvent>) -> GatewayResponse {
    let context = InvocationContext::from(&event.context);
    self.handle(&event.payload, &context).await
  }

  /// Handle an API Gateway event with an arbitrary invocation context.
  ///
  /// Builds the synthetic request/response pair, invokes the handler, waits for the response to
  /// end and serializes it. Request construction failures and handler panics are converted to
  /// error responses (see `impl From<EventError> for HttpResponse`).
  ///
  /// There is no timeout: if the handler never ends the response, this future never resolves.
  pub async fn handle<C>(&self, event: &GatewayEvent, context: &C) -> GatewayResponse
  where
    C: Serialize + ?Sized,
  {
    log::info!("Handling HTTP {} {}", event.http_method, event.path);

    match self.try_handle(event, context).await {
      Ok(response) => response,
      Err(err) => {
        log::error!(
          "Failed to handle request: {}",
          format_error(&err, Some(err.name()), err.backtrace())
        );
        GatewayResponse::from(HttpResponse::from(err))
      }
    }
  }

  async fn try_handle<C>(
    &self,
    event: &GatewayEvent,
    context: &C,
  ) -> Result<GatewayResponse, EventError>
  where
    C: Serialize + ?Sized,
  {
    let request = SyntheticRequest::build(event, context)?;
    let response = SyntheticResponse::new();

    AssertUnwindSafe(self.handler.handle(request, response.clone()))
      .catch_unwind()
      .await
      .map_err(|panic| EventError::Panic(panic_string(panic), Backtrace::new()))?;

    log::trace!("Handler returned; waiting for the response to end");
    response.ended().await;

    Ok(to_apigw_response(
      &response,
      self.config.get_binary_mime_types(),
    ))
  }
}

/// Start the Lambda runtime and serve every API Gateway event with `bridge`.
///
/// # Example
///
/// ```rust,no_run
/// use apigw_bridge::{run_lambda, Bridge, BridgeConfig, SyntheticRequest, SyntheticResponse};
///
/// #[tokio::main]
/// pub async fn main() {
///   let handler = |request: SyntheticRequest, response: SyntheticResponse| async move {
///     response.set_header("content-type", "text/plain");
///     response.end(format!("{} {}", request.method, request.path));
///   };
///
///   run_lambda(Bridge::new(handler, BridgeConfig::new())).await
/// }
/// ```
pub async fn run_lambda<H>(bridge: Bridge<H>)
where
  H: ServerHandler,
{
  let bridge = &bridge;
  lambda_runtime::run(service_fn(move |event: LambdaEvent<GatewayEvent>| {
    bridge
      .handle_event(event)
      .map(Result::<_, std::convert::Infallible>::Ok)
  }))
  .await
  .expect("Lambda run loop should never exit")
}

/// Extract the panic message after catching a panic.
fn panic_string(panic: Box<dyn Any + Send>) -> String {
  panic
    .downcast::<String>()
    .map(|panic| *panic)
    .or_else(|panic| panic.downcast::<&str>().map(|msg| msg.to_string()))
    .unwrap_or_else(|_| "<non-string panic payload>".to_string())
}
