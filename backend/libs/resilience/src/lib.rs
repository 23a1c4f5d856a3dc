/// Resilience patterns for outbound delivery
///
/// This library provides the retry primitives used by the courier:
/// - **Exponential Backoff**: randomized, growing intervals bounded by a total elapsed-time budget
/// - **Retry**: bounded attempt count with exponential backoff and jitter for transient failures
/// - **Preset Configurations**: pre-tuned settings for the dispatch loop and HTTP providers
///
/// # Example: Retrying a provider call
///
/// ```rust,no_run
/// use resilience::{presets, retry::with_retry_if};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::http_provider_retry();
///
///     let result = with_retry_if(
///         config,
///         |e: &String| e.starts_with("503"),
///         || async {
///             // Your HTTP call here
///             Ok::<_, String>(())
///         },
///     )
///     .await;
/// }
/// ```
///
/// # Example: Driving a loop with an elapsed-time budget
///
/// ```rust,no_run
/// use resilience::ExponentialBackoff;
///
/// #[tokio::main]
/// async fn main() {
///     let mut backoff = ExponentialBackoff::default().start();
///
///     while let Some(delay) = backoff.next_delay() {
///         // Attempt the operation, break on success
///         tokio::time::sleep(delay).await;
///     }
/// }
/// ```

pub mod backoff;
pub mod presets;
pub mod retry;

// Re-export main types for convenience
pub use backoff::{Backoff, ExponentialBackoff};
pub use presets::{dispatch_backoff, http_provider_retry};
pub use retry::{RetryConfig, RetryError, with_retry, with_retry_if};
