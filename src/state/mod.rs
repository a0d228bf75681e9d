//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Stage`: the phases of the crawl state machine
//! - `RequestState`: lifecycle of a single request under the retry policy
//! - `RequestContext`: the typed bag threaded through one request

mod request;
mod stage;

// Re-export main types
pub use request::{RequestContext, RequestState};
pub use stage::Stage;
