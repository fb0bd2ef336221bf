// Resilient execution: retry with backoff, timeouts, fallbacks, cancellation
// and connectivity gating for any unreliable async operation.

pub mod cancel;
pub mod clock;
pub mod connectivity;
pub mod error;
pub mod executor;
pub mod http;
pub mod policy;

pub use cancel::CancellationToken;
pub use clock::{Clock, ManualClock, SystemClock};
pub use connectivity::{ConnectivityMonitor, ConnectivityProbe, HttpProbe};
pub use error::OperationError;
pub use executor::{HttpStatus, OperationOutcome, ResilientExecutor};
pub use http::HttpFetcher;
pub use policy::{is_retryable, RetryEvent, RetryPolicy};
