//! Render pipeline: everything between a caller's request and a [`Report`](crate::Report).
//!
//! - [`serializer`]: normalizes every request shape into a [`RenderPayload`]
//!   and produces the canonical JSON body.
//! - [`transport`]: the HTTP exchange over a shared connection pool.
//! - [`cancel`]: [`CancelScope`] links the configured timeout with a caller's
//!   cancellation token into one abort path.
//! - [`response`]: turns a response into a [`Report`](crate::Report) or a
//!   structured [`JsReportError`](crate::JsReportError).

pub mod cancel;
pub mod response;
pub mod serializer;
pub mod transport;

pub use cancel::CancelScope;
pub use serializer::{RenderData, RenderPayload};
pub use transport::Transport;
