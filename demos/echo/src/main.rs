use apigw_bridge::{
  run_lambda, Bridge, BridgeConfig, InvocationContext, SyntheticRequest, SyntheticResponse,
};
use serde_json::json;

/// Echo the request back as JSON.
async fn echo(request: SyntheticRequest, response: SyntheticResponse) {
  let request_id = match request.apigateway_context::<InvocationContext>() {
    Ok(context) => context.aws_request_id,
    Err(err) => {
      log::warn!("Failed to decode invocation context: {err}");
      String::new()
    }
  };

  let body = json!({
    "method": request.method.as_str(),
    "path": request.path,
    "headers": request.headers,
    "body": request
      .body
      .as_deref()
      .map(String::from_utf8_lossy),
    "requestId": request_id,
  });

  response.set_header("content-type", "application/json");
  response.set_header("x-echo", "1");
  response.end(body.to_string());
}

#[tokio::main]
pub async fn main() {
  // TIP: Use the `log4rs` crate for more fine-grained control over logging.
  env_logger::init();

  let config = BridgeConfig::new().binary_mime_types(["application/octet-stream", "image/*"]);

  run_lambda(Bridge::new(echo, config)).await
}
