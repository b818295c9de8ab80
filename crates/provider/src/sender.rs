use async_trait::async_trait;
use herald_core::SendResult;

/// Strongly-typed transport capability with native `async fn`.
///
/// A sender delivers an already-formatted payload to a webhook URL and
/// classifies the outcome as a [`SendResult`]. Senders never return errors:
/// every failure mode is expressed through the result's retryable flag.
///
/// This trait is **not** object-safe. Implement it and rely on the blanket
/// [`DynSender`] implementation when a trait object is needed.
pub trait Sender: Send + Sync {
    /// The platform this sender serves (e.g. `slack`).
    fn platform(&self) -> &str;

    /// Deliver `payload` to `url`.
    fn send(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> impl std::future::Future<Output = SendResult> + Send;
}

/// Object-safe sender trait for use behind `Arc<dyn DynSender>`.
///
/// You generally should not implement this trait directly -- implement
/// [`Sender`] and rely on the blanket implementation.
#[async_trait]
pub trait DynSender: Send + Sync {
    /// The platform this sender serves.
    fn platform(&self) -> &str;

    /// Deliver `payload` to `url`.
    async fn send(&self, url: &str, payload: &serde_json::Value) -> SendResult;
}

/// Blanket implementation bridging static and dynamic dispatch.
#[async_trait]
impl<T: Sender + Sync> DynSender for T {
    fn platform(&self) -> &str {
        Sender::platform(self)
    }

    async fn send(&self, url: &str, payload: &serde_json::Value) -> SendResult {
        Sender::send(self, url, payload).await
    }
}
