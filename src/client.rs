//! Authenticated request dispatch for unary service calls.
//!
//! Endpoint wrappers build a [`Request`] and hand it to [`ServiceClient::send`];
//! everything else (headers, auth, classification) happens here.

pub mod builder;
pub mod core;
pub mod dispatch;
pub mod headers;
pub mod request;
pub mod response;

pub use builder::ServiceClientBuilder;
pub use core::ServiceClient;
pub use dispatch::TRANSACTION_ID_HEADER;
pub use headers::HeaderList;
pub use request::{Body, FormBody, FormPart, FormValue, Request, RequestBuilder};
pub use response::{ResponseBody, ResponseEnvelope};
