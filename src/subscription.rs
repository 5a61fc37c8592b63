use crate::error::{WebOsError, Result};
use crate::protocol::Response;
use serde_json::Value;
use tokio::sync::mpsc;

/// Receiver for pushes of one durable subscription
///
/// Pushes arrive in the order the television sent them. The stream ends with
/// [`WebOsError::ConnectionClosed`] once the control session is gone;
/// subscriptions never survive a reconnect.
pub struct Subscription {
    uri: String,
    rx: mpsc::UnboundedReceiver<Response>,
}

impl Subscription {
    /// Create a new subscription receiver
    pub(crate) fn new(uri: impl Into<String>, rx: mpsc::UnboundedReceiver<Response>) -> Self {
        Self { uri: uri.into(), rx }
    }

    /// Endpoint this subscription was registered for
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Receive the next push
    ///
    /// A push carrying an error is returned as `Err` without ending the
    /// stream; only [`WebOsError::ConnectionClosed`] is terminal.
    pub async fn recv(&mut self) -> Result<Value> {
        match self.rx.recv().await {
            Some(response) => response.into_result(),
            None => Err(WebOsError::ConnectionClosed),
        }
    }

    /// Try to receive a push without blocking
    ///
    /// Returns `None` if no message is available.
    pub fn try_recv(&mut self) -> Result<Option<Value>> {
        match self.rx.try_recv() {
            Ok(response) => response.into_result().map(Some),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(WebOsError::ConnectionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn pushes_arrive_in_order_then_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = Subscription::new("ssap://audio/getVolume", rx);

        tx.send(Response::push(json!({ "volume": 1 }))).unwrap();
        tx.send(Response::push(json!({ "volume": 2 }))).unwrap();
        drop(tx);

        assert_eq!(sub.recv().await.unwrap()["volume"], 1);
        assert_eq!(sub.recv().await.unwrap()["volume"], 2);
        assert!(matches!(sub.recv().await, Err(WebOsError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn error_push_does_not_end_stream() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = Subscription::new("ssap://tv/getCurrentChannel", rx);

        tx.send(Response::push(json!({ "returnValue": false, "errorText": "no tuner" })))
            .unwrap();
        tx.send(Response::push(json!({ "channelNumber": "7" }))).unwrap();

        assert!(matches!(sub.recv().await, Err(WebOsError::ApiError { .. })));
        assert_eq!(sub.recv().await.unwrap()["channelNumber"], "7");
        assert!(sub.try_recv().unwrap().is_none());
    }
}
