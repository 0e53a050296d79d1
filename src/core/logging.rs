//! Logging utilities with request and provider context support.
//!
//! Proxy calls run inside task-local scopes so that log lines emitted deep
//! in the translator or normalizer can be attributed to a request.

tokio::task_local! {
    /// Task-local storage for the current provider route name.
    pub static PROVIDER_CONTEXT: String;
}

tokio::task_local! {
    /// Task-local storage for the current request ID.
    ///
    /// This is the client's `requestId` when one was supplied, otherwise a
    /// generated UUID.
    pub static REQUEST_ID: String;
}

/// Get the current provider name from context, if set.
///
/// Returns an empty string if no provider context is set.
pub fn get_provider_context() -> String {
    PROVIDER_CONTEXT
        .try_with(|ctx| ctx.clone())
        .unwrap_or_default()
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Execute an async block with request context (request_id, provider).
///
/// # Example
///
/// ```ignore
/// with_request_context!(request_id, provider_name, async {
///     // handler logic here
/// })
/// ```
#[macro_export]
macro_rules! with_request_context {
    ($request_id:expr, $provider_name:expr, $body:expr) => {
        $crate::core::logging::REQUEST_ID
            .scope($request_id, async {
                $crate::core::logging::PROVIDER_CONTEXT
                    .scope($provider_name, $body)
                    .await
            })
            .await
    };
}
