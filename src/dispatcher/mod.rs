//! Transport dispatchers (Components H and I). Both share the same
//! `ToolEnvelope` (G) so there is exactly one execution path regardless of
//! which transport a client connects over.

pub mod http;
pub mod stdio;

pub use http::router as http_router;
pub use stdio::{ExitOutcome, StdioDispatcher};
