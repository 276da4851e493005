#![doc = include_str!("../../README.md")]
#![warn(missing_docs)]

// These are documented public exports since the public API depends on them.
pub use async_trait;
pub use aws_lambda_events::encodings::Body;
pub use http::{Response, StatusCode};
pub use lambda_runtime::{Context as LambdaContext, LambdaEvent};

mod apigw;

pub use apigw::{to_apigw_response, GatewayResponse};

mod apply;

pub use apply::{apply_result, HandlerResult, ServerResponse};

mod config;

pub use config::BridgeConfig;

/// Content-Type classification for response bodies.
pub mod content_type;

mod encoding;

/// Error handling.
pub mod error;

pub use error::EventError;

mod extract;

pub use extract::to_event_context;

/// Header values shared by synthetic requests and responses.
pub mod header;

pub use header::HeaderValues;

mod request;

pub use request::{
  GatewayEvent, InvocationContext, SyntheticRequest, CONTEXT_HEADER, EVENT_HEADER,
};

mod response;

pub use response::{SyntheticResponse, DEFAULT_STATUS_CODE};

mod runtime;

pub use runtime::{run_lambda, Bridge, ServerHandler};

/// HTTP response.
pub type HttpResponse = Response<Body>;
