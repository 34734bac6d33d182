//! The boundary with the API: envelopes, payload shapes and loading.
//!
//! Every payload is wrapped as `{"ok": true, "data": ...}` or
//! `{"ok": false, "error": "..."}`. Loads run on tokio tasks; each one is
//! tagged with a [`RequestToken`] and only the answer to the most recently
//! issued request is ever handed back.

use crate::error::ApiError;
use crate::pivot::MonthlyClassRow;
use crate::value::Record;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use tokio::sync::mpsc;

pub const DEFAULT_FAILURE: &str = "API request failed";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Unwrap an envelope into its payload, or into the server's message.
pub fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if !envelope.ok {
        let message = envelope
            .error
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FAILURE.to_string());
        tracing::warn!(%message, "upstream reported a failure");
        return Err(ApiError::Upstream(message));
    }
    Ok(serde_json::from_value(envelope.data)?)
}

/// Read an envelope from disk and decode it.
pub async fn load_payload<T: DeserializeOwned>(path: &Path) -> Result<T, ApiError> {
    let body = tokio::fs::read_to_string(path).await?;
    decode_envelope(&body)
}

/// `/api/charts/dashboard`. Only the monthly class summary is consumed here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardPayload {
    #[serde(default)]
    pub monthly_class_summary: Vec<MonthlyClassRow>,
}

/// `/api/fixed-incomes`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixedIncomePayload {
    #[serde(default)]
    pub summary: Record,
    #[serde(default)]
    pub items: Vec<Record>,
}

/// `/api/portfolio/snapshot`: headline totals plus positions grouped by the
/// server under asset-class keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotPayload {
    #[serde(default)]
    pub grouped_positions: BTreeMap<String, Vec<Record>>,
    #[serde(flatten)]
    pub totals: Record,
}

impl SnapshotPayload {
    /// All positions as one flat list, each tagged with the key of the group
    /// it came from unless it already names its own category.
    pub fn positions(&self) -> Vec<Record> {
        self.grouped_positions
            .iter()
            .flat_map(|(key, items)| {
                items.iter().cloned().map(move |mut item| {
                    item.set_if_missing("category", Value::String(key.clone()));
                    item
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestToken(u64);

/// Monotonic generation counter for outgoing requests.
#[derive(Debug, Default)]
pub struct RequestTracker {
    latest: u64,
}

impl RequestTracker {
    pub fn issue(&mut self) -> RequestToken {
        self.latest += 1;
        RequestToken(self.latest)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        token.0 == self.latest
    }
}

type Tagged<T> = (RequestToken, Result<T, ApiError>);

/// Runs requests in the background and keeps only the newest answer.
///
/// Starting a request supersedes every request still in flight; their
/// answers are dropped on arrival instead of overwriting newer state.
///
/// Only the spawned tasks hold the sending side, so a task that dies before
/// answering closes the channel and [`LatestResponse::latest`] reports
/// [`ApiError::Disconnected`].
#[derive(Debug)]
pub struct LatestResponse<T> {
    tracker: RequestTracker,
    pending: bool,
    sender: mpsc::WeakUnboundedSender<Tagged<T>>,
    receiver: mpsc::UnboundedReceiver<Tagged<T>>,
}

impl<T: Send + 'static> Default for LatestResponse<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> LatestResponse<T> {
    pub fn new() -> LatestResponse<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        LatestResponse {
            tracker: RequestTracker::default(),
            pending: false,
            sender: sender.downgrade(),
            receiver,
        }
    }

    // Reopen the channel once every task holding it is gone.
    fn live_sender(&mut self) -> mpsc::UnboundedSender<Tagged<T>> {
        if let Some(sender) = self.sender.upgrade() {
            return sender;
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        self.sender = sender.downgrade();
        self.receiver = receiver;
        sender
    }

    pub fn spawn<F>(&mut self, request: F) -> RequestToken
    where
        F: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let token = self.tracker.issue();
        self.pending = true;
        let sender = self.live_sender();
        tokio::spawn(async move {
            let result = request.await;
            // the receiving side may already be gone
            let _ = sender.send((token, result));
        });
        token
    }

    pub fn is_loading(&self) -> bool {
        self.pending
    }

    fn accept(&mut self, token: RequestToken, result: Result<T, ApiError>) -> Option<Result<T, ApiError>> {
        if self.tracker.is_current(token) {
            self.pending = false;
            Some(result)
        } else {
            tracing::debug!(?token, "discarding stale response");
            None
        }
    }

    /// Non-blocking: the newest answer if it already arrived.
    pub fn try_latest(&mut self) -> Option<Result<T, ApiError>> {
        while let Ok((token, result)) = self.receiver.try_recv() {
            if let Some(accepted) = self.accept(token, result) {
                return Some(accepted);
            }
        }
        None
    }

    /// Wait for the answer to the newest request.
    pub async fn latest(&mut self) -> Result<T, ApiError> {
        if !self.pending {
            return Err(ApiError::Idle);
        }
        while let Some((token, result)) = self.receiver.recv().await {
            if let Some(accepted) = self.accept(token, result) {
                return accepted;
            }
        }
        self.pending = false;
        Err(ApiError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Portfolio;
    use std::time::Duration;

    #[test]
    fn test_decode_success() {
        let body = r#"{"ok": true, "data": [{"id": 1, "name": "Principal"}, {"id": "2", "name": "Filhos"}]}"#;
        let portfolios: Vec<Portfolio> = decode_envelope(body).unwrap();
        assert_eq!(portfolios.len(), 2);
        assert_eq!(portfolios[1].id.get(), 2);
    }

    #[test]
    fn test_decode_failure_keeps_message() {
        let body = r#"{"ok": false, "error": "Carteira nao encontrada"}"#;
        let result: Result<Vec<Portfolio>, ApiError> = decode_envelope(body);
        match result {
            Err(ApiError::Upstream(message)) => assert_eq!(message, "Carteira nao encontrada"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_decode_failure_without_message() {
        let result: Result<Vec<Portfolio>, ApiError> = decode_envelope(r#"{"ok": false}"#);
        assert_eq!(result.unwrap_err().to_string(), DEFAULT_FAILURE);
    }

    #[test]
    fn test_decode_malformed_body() {
        let result: Result<Vec<Portfolio>, ApiError> = decode_envelope("<html>502</html>");
        assert!(matches!(result, Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_dashboard_payload_tolerates_missing_summary() {
        let payload: DashboardPayload =
            decode_envelope(r#"{"ok": true, "data": {"category_chart": {}}}"#).unwrap();
        assert!(payload.monthly_class_summary.is_empty());
    }

    #[test]
    fn test_snapshot_positions_are_tagged() {
        let body = r#"{"ok": true, "data": {
            "total_value": 300,
            "grouped_positions": {
                "fiis": [{"ticker": "HGLG11", "value": 100}],
                "br_stocks": [{"ticker": "PETR4", "value": 200, "category": "br_stocks"}]
            }
        }}"#;
        let snapshot: SnapshotPayload = decode_envelope(body).unwrap();
        assert_eq!(snapshot.totals.number("total_value"), 300.0);

        let positions = snapshot.positions();
        assert_eq!(positions.len(), 2);
        let hglg = positions.iter().find(|p| p.text("ticker") == "HGLG11").unwrap();
        assert_eq!(hglg.text("category"), "fiis");
    }

    #[tokio::test]
    async fn test_load_payload_from_file() {
        let path = std::env::temp_dir().join(format!("carteira_rs_payload_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"ok": true, "data": {"items": [{"issuer": "Banco X"}]}}"#).unwrap();

        let payload: FixedIncomePayload = load_payload(&path).await.unwrap();
        assert_eq!(payload.items[0].text("issuer"), "Banco X");
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_load_payload_missing_file() {
        let result: Result<FixedIncomePayload, ApiError> =
            load_payload(Path::new("/nonexistent/carteira_rs/payload.json")).await;
        assert!(matches!(result, Err(ApiError::Io(_))));
    }

    #[test]
    fn test_tracker_only_latest_is_current() {
        let mut tracker = RequestTracker::default();
        let first = tracker.issue();
        let second = tracker.issue();
        assert!(first < second);
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
    }

    #[tokio::test]
    async fn test_superseded_slow_request_is_discarded() {
        let mut loader: LatestResponse<u32> = LatestResponse::new();
        loader.spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        });
        loader.spawn(async { Ok(2) });

        assert_eq!(loader.latest().await.unwrap(), 2);
        assert!(!loader.is_loading());

        // the stale answer arrives later and is never surfaced
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(loader.try_latest().is_none());
    }

    #[tokio::test]
    async fn test_stale_answer_arriving_first_is_skipped() {
        let mut loader: LatestResponse<u32> = LatestResponse::new();
        loader.spawn(async { Ok(1) });
        loader.spawn(async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(2)
        });

        assert_eq!(loader.latest().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upstream_error_is_delivered() {
        let mut loader: LatestResponse<u32> = LatestResponse::new();
        loader.spawn(async { Err(ApiError::Upstream("Falha".to_string())) });
        assert_eq!(loader.latest().await.unwrap_err().to_string(), "Falha");
    }

    #[tokio::test]
    async fn test_dead_request_task_disconnects() {
        let mut loader: LatestResponse<u32> = LatestResponse::new();
        loader.spawn(async {
            let broken = true;
            if broken {
                panic!("request task died");
            }
            Ok(1)
        });

        let result = tokio::time::timeout(Duration::from_secs(2), loader.latest())
            .await
            .expect("latest() must not hang on a dead task");
        assert!(matches!(result, Err(ApiError::Disconnected)));
        assert!(!loader.is_loading());

        // the loader keeps working after the channel was closed
        loader.spawn(async { Ok(7) });
        assert_eq!(loader.latest().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_latest_without_request_is_idle() {
        let mut loader: LatestResponse<u32> = LatestResponse::new();
        assert!(matches!(loader.latest().await, Err(ApiError::Idle)));
        assert!(loader.try_latest().is_none());
    }
}
