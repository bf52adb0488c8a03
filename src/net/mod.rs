//! Network plumbing shared by the probes: client policy, fetch errors, retry.

mod error;
mod http_client;
mod retry;
mod user_agent;

pub use error::FetchError;
pub use http_client::{HttpSettings, build_http_client};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error, run_with_retry,
};
pub use user_agent::{default_api_user_agent, default_page_user_agent};
