//! Routes decoded responses and events to waiting callers.
//!
//! Each wait is keyed by request `seq` or event name and parked on a oneshot
//! channel. Messages that arrive with nobody waiting go to a backlog, so a
//! wait registered after the message physically arrived still observes it.
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use crate::error::DapError;
use crate::protocol::{Event, Response};

/// A decoded message the router knows how to deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A response, correlated by `request_seq`.
    Response(Response),
    /// An event, correlated by name.
    Event(Event),
}

impl Incoming {
    fn key(&self) -> WaitKey {
        match self {
            Incoming::Response(resp) => WaitKey::Response(resp.request_seq),
            Incoming::Event(evt) => WaitKey::Event(evt.event.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum WaitKey {
    Response(i64),
    Event(String),
}

impl fmt::Display for WaitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitKey::Response(seq) => write!(f, "response to seq {seq}"),
            WaitKey::Event(name) => write!(f, "event '{name}'"),
        }
    }
}

#[derive(Debug, Default)]
struct RouterState {
    /// Key to the id of the waiter parked on it. One waiter may hold
    /// several keys; the first matching message releases all of them.
    waiters: HashMap<WaitKey, u64>,
    senders: HashMap<u64, oneshot::Sender<Incoming>>,
    next_waiter: u64,
    orphans: BTreeMap<i64, Response>,
    events: HashMap<String, VecDeque<Event>>,
    closed: bool,
}

impl RouterState {
    fn backlog(&mut self, msg: Incoming) {
        match msg {
            Incoming::Response(resp) => {
                tracing::debug!(
                    request_seq = resp.request_seq,
                    command = %resp.command,
                    "no waiter for response; keeping as orphan"
                );
                if let Some(old) = self.orphans.insert(resp.request_seq, resp) {
                    tracing::warn!(
                        request_seq = old.request_seq,
                        "duplicate response for the same request; keeping the newest"
                    );
                }
            }
            Incoming::Event(evt) => {
                tracing::debug!(event = %evt.event, "no waiter for event; buffering");
                self.events.entry(evt.event.clone()).or_default().push_back(evt);
            }
        }
    }

    fn take_backlog(&mut self, key: &WaitKey) -> Option<Incoming> {
        match key {
            WaitKey::Response(seq) => self.orphans.remove(seq).map(Incoming::Response),
            WaitKey::Event(name) => {
                let queue = self.events.get_mut(name)?;
                let evt = queue.pop_front();
                if queue.is_empty() {
                    self.events.remove(name);
                }
                evt.map(Incoming::Event)
            }
        }
    }

    /// Unregister waiter `id` from every key it holds.
    fn release(&mut self, id: u64) -> Option<oneshot::Sender<Incoming>> {
        self.waiters.retain(|_, waiter| *waiter != id);
        self.senders.remove(&id)
    }

    fn register(
        &mut self,
        keys: &[WaitKey],
    ) -> Result<(u64, oneshot::Receiver<Incoming>), DapError> {
        for key in keys {
            let Some(&id) = self.waiters.get(key) else {
                continue;
            };
            // A sender whose receiver is gone belongs to a cancelled wait.
            if self.senders.get(&id).is_some_and(|tx| !tx.is_closed()) {
                return Err(DapError::DuplicateWait(key.to_string()));
            }
            self.release(id);
        }
        let id = self.next_waiter;
        self.next_waiter += 1;
        let (tx, rx) = oneshot::channel();
        self.senders.insert(id, tx);
        for key in keys {
            self.waiters.insert(key.clone(), id);
        }
        Ok((id, rx))
    }
}

/// Matches incoming messages against pending waits.
///
/// All mutation goes through one mutex. Only one waiter per key may be
/// pending at a time.
#[derive(Debug, Default)]
pub struct MessageRouter {
    state: Mutex<RouterState>,
}

impl MessageRouter {
    /// Create an empty, open router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to its waiter, or backlog it.
    pub async fn on_message(&self, msg: Incoming) {
        let mut state = self.state.lock().await;
        let key = msg.key();
        let sender = match state.waiters.get(&key).copied() {
            Some(id) => state.release(id),
            None => None,
        };
        match sender {
            Some(sender) => {
                // The waiter may have given up between registering and now.
                if let Err(msg) = sender.send(msg) {
                    state.backlog(msg);
                }
            }
            None => state.backlog(msg),
        }
    }

    /// Wait for the response to request `seq`.
    ///
    /// Returns the response whatever its `success` flag says.
    pub async fn wait_for_response(
        &self,
        seq: i64,
        timeout: Duration,
    ) -> Result<Response, DapError> {
        match self.wait(vec![WaitKey::Response(seq)], timeout).await? {
            Incoming::Response(resp) => Ok(resp),
            Incoming::Event(evt) => Err(DapError::InvalidResponse(format!(
                "event '{}' delivered to a response wait",
                evt.event
            ))),
        }
    }

    /// Wait for the next event called `name`, oldest buffered first.
    pub async fn wait_for_event(&self, name: &str, timeout: Duration) -> Result<Event, DapError> {
        self.wait_for_any_event(&[name], timeout).await
    }

    /// Wait for the first of several events.
    ///
    /// Buffered events are checked in the order of `names`, so an earlier
    /// name wins when more than one is already waiting. Otherwise the first
    /// to arrive is returned and the others stay buffered.
    pub async fn wait_for_any_event(
        &self,
        names: &[&str],
        timeout: Duration,
    ) -> Result<Event, DapError> {
        let keys = names
            .iter()
            .map(|name| WaitKey::Event(name.to_string()))
            .collect();
        match self.wait(keys, timeout).await? {
            Incoming::Event(evt) => Ok(evt),
            Incoming::Response(resp) => Err(DapError::InvalidResponse(format!(
                "response to seq {} delivered to an event wait",
                resp.request_seq
            ))),
        }
    }

    /// Remove and return every buffered event called `name` without waiting.
    pub async fn drain_events(&self, name: &str) -> Vec<Event> {
        self.state
            .lock()
            .await
            .events
            .remove(name)
            .map(Vec::from)
            .unwrap_or_default()
    }

    async fn wait(&self, keys: Vec<WaitKey>, timeout: Duration) -> Result<Incoming, DapError> {
        let (id, mut rx) = {
            let mut state = self.state.lock().await;
            for key in &keys {
                if let Some(msg) = state.take_backlog(key) {
                    return Ok(msg);
                }
            }
            if state.closed {
                return Err(DapError::ConnectionClosed);
            }
            state.register(&keys)?
        };

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(DapError::ConnectionClosed),
            Err(_) => {
                self.state.lock().await.release(id);
                // A delivery can land between the deadline and the removal.
                match rx.try_recv() {
                    Ok(msg) => Ok(msg),
                    Err(_) => Err(DapError::Timeout {
                        waiting_for: describe(&keys),
                    }),
                }
            }
        }
    }

    /// Fail every pending and future wait with `ConnectionClosed`.
    ///
    /// Messages already in the backlog stay retrievable.
    pub async fn close(&self, reason: &str) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        let failed = state.senders.len();
        // Dropping the senders wakes each receiver with an error.
        state.senders.clear();
        state.waiters.clear();
        tracing::debug!(reason, failed_waits = failed, "router closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Number of waits currently registered.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.senders.len()
    }

    /// Number of responses that arrived with no waiter.
    pub async fn orphan_count(&self) -> usize {
        self.state.lock().await.orphans.len()
    }

    /// Number of buffered events called `name`.
    pub async fn backlog_len(&self, name: &str) -> usize {
        self.state
            .lock()
            .await
            .events
            .get(name)
            .map_or(0, |q| q.len())
    }
}

fn describe(keys: &[WaitKey]) -> String {
    keys.iter()
        .map(WaitKey::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn response(request_seq: i64, success: bool) -> Incoming {
        Incoming::Response(Response {
            seq: request_seq + 100,
            request_seq,
            success,
            command: "test".into(),
            message: None,
            body: None,
        })
    }

    fn event(name: &str, marker: i64) -> Incoming {
        Incoming::Event(Event {
            seq: marker,
            event: name.into(),
            body: Some(serde_json::json!({ "marker": marker })),
        })
    }

    async fn wait_for_pending(router: &MessageRouter, n: usize) {
        while router.pending_count().await < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn router_delivers_to_registered_waiter() {
        let router = Arc::new(MessageRouter::new());
        let waiter = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.wait_for_response(1, Duration::from_secs(5)).await })
        };
        wait_for_pending(&router, 1).await;

        router.on_message(response(1, true)).await;
        let resp = waiter.await.unwrap().unwrap();
        assert_eq!(resp.request_seq, 1);
        assert_eq!(router.pending_count().await, 0);
        assert_eq!(router.orphan_count().await, 0);
    }

    #[tokio::test]
    async fn router_returns_failed_responses() {
        let router = MessageRouter::new();
        router.on_message(response(4, false)).await;
        let resp = router
            .wait_for_response(4, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!resp.success);
    }

    #[tokio::test]
    async fn router_orphan_response_is_kept() {
        let router = MessageRouter::new();
        router.on_message(response(42, true)).await;
        assert_eq!(router.orphan_count().await, 1);
        assert!(!router.is_closed().await);

        let resp = router
            .wait_for_response(42, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resp.request_seq, 42);
        assert_eq!(router.orphan_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn router_replays_event_backlog_in_order_without_blocking() {
        let router = MessageRouter::new();
        for marker in 1..=3 {
            router.on_message(event("output", marker)).await;
        }
        router.on_message(event("stopped", 99)).await;
        assert_eq!(router.backlog_len("output").await, 3);

        let start = Instant::now();
        for expected in 1..=3 {
            let evt = router
                .wait_for_event("output", Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(evt.seq, expected);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(router.backlog_len("output").await, 0);
        assert_eq!(router.backlog_len("stopped").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn router_times_out_without_match() {
        let router = MessageRouter::new();
        let start = Instant::now();
        let err = router
            .wait_for_response(7, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DapError::Timeout { .. }), "got: {err}");
        assert!(err.to_string().contains("response to seq 7"));
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(router.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn router_backlog_hit_returns_immediately() {
        let router = MessageRouter::new();
        router.on_message(response(3, true)).await;
        let start = Instant::now();
        router
            .wait_for_response(3, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn router_late_response_becomes_orphan() {
        let router = MessageRouter::new();
        let err = router
            .wait_for_response(5, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DapError::Timeout { .. }));

        router.on_message(response(5, true)).await;
        assert_eq!(router.orphan_count().await, 1);
        let resp = router
            .wait_for_response(5, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(resp.request_seq, 5);
    }

    #[tokio::test]
    async fn router_close_fails_all_pending_waits() {
        let router = Arc::new(MessageRouter::new());
        let mut waiters = Vec::new();
        for seq in 1..=2 {
            let router = Arc::clone(&router);
            waiters.push(tokio::spawn(async move {
                router
                    .wait_for_response(seq, Duration::from_secs(60))
                    .await
                    .map(|_| ())
            }));
        }
        {
            let router = Arc::clone(&router);
            waiters.push(tokio::spawn(async move {
                router
                    .wait_for_event("stopped", Duration::from_secs(60))
                    .await
                    .map(|_| ())
            }));
        }
        wait_for_pending(&router, 3).await;

        router.close("test").await;
        for waiter in waiters {
            let err = waiter.await.unwrap().unwrap_err();
            assert!(matches!(err, DapError::ConnectionClosed), "got: {err}");
        }
        assert_eq!(router.pending_count().await, 0);
    }

    #[tokio::test]
    async fn router_future_waits_fail_after_close() {
        let router = MessageRouter::new();
        router.on_message(event("terminated", 1)).await;
        router.close("peer hung up").await;
        assert!(router.is_closed().await);

        // Already-arrived messages remain observable.
        router
            .wait_for_event("terminated", Duration::from_secs(1))
            .await
            .unwrap();

        let err = router
            .wait_for_event("stopped", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DapError::ConnectionClosed));
        let err = router
            .wait_for_response(9, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DapError::ConnectionClosed));
    }

    #[tokio::test]
    async fn router_rejects_second_waiter_for_same_key() {
        let router = Arc::new(MessageRouter::new());
        let first = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router
                    .wait_for_event("stopped", Duration::from_secs(60))
                    .await
            })
        };
        wait_for_pending(&router, 1).await;

        let err = router
            .wait_for_event("stopped", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DapError::DuplicateWait(_)), "got: {err}");

        // The original waiter is untouched and still receives the event.
        router.on_message(event("stopped", 1)).await;
        assert_eq!(first.await.unwrap().unwrap().seq, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn router_cancelled_wait_does_not_lose_message() {
        let router = MessageRouter::new();
        let cancelled = tokio::time::timeout(
            Duration::from_millis(1),
            router.wait_for_event("output", Duration::from_secs(60)),
        )
        .await;
        assert!(cancelled.is_err());

        // The stale registration swallows nothing.
        router.on_message(event("output", 7)).await;
        assert_eq!(router.backlog_len("output").await, 1);

        let evt = router
            .wait_for_event("output", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(evt.seq, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn router_cancelled_wait_allows_new_registration() {
        let router = Arc::new(MessageRouter::new());
        let _ = tokio::time::timeout(
            Duration::from_millis(1),
            router.wait_for_response(2, Duration::from_secs(60)),
        )
        .await;

        let waiter = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.wait_for_response(2, Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;
        router.on_message(response(2, true)).await;
        assert_eq!(waiter.await.unwrap().unwrap().request_seq, 2);
    }

    #[tokio::test]
    async fn router_any_event_keeps_the_events_it_does_not_return() {
        let router = Arc::new(MessageRouter::new());
        let waiter = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let names = ["terminated", "exited", "stopped"];
                router
                    .wait_for_any_event(&names, Duration::from_secs(5))
                    .await
            })
        };
        wait_for_pending(&router, 1).await;

        // Both land before the waiter is polled again.
        router.on_message(event("exited", 7)).await;
        router.on_message(event("terminated", 8)).await;

        let first = waiter.await.unwrap().unwrap();
        assert_eq!(first.event, "exited");
        assert_eq!(router.pending_count().await, 0);
        assert_eq!(router.backlog_len("terminated").await, 1);
        let second = router
            .wait_for_event("terminated", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(second.seq, 8);
    }

    #[tokio::test]
    async fn router_any_event_prefers_earlier_names_in_backlog() {
        let router = MessageRouter::new();
        router.on_message(event("stopped", 1)).await;
        router.on_message(event("terminated", 2)).await;

        let evt = router
            .wait_for_any_event(&["terminated", "stopped"], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(evt.event, "terminated");
        assert_eq!(router.backlog_len("stopped").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn router_any_event_timeout_names_every_event() {
        let router = MessageRouter::new();
        let err = router
            .wait_for_any_event(&["exited", "stopped"], Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "timed out waiting for event 'exited' or event 'stopped'"
        );
        assert_eq!(router.pending_count().await, 0);

        // Nothing is left registered under either name.
        router.on_message(event("stopped", 3)).await;
        assert_eq!(router.backlog_len("stopped").await, 1);
    }

    #[tokio::test]
    async fn router_drain_events_empties_one_backlog() {
        let router = MessageRouter::new();
        for marker in 1..=2 {
            router.on_message(event("output", marker)).await;
        }
        router.on_message(event("stopped", 9)).await;

        let drained: Vec<i64> = router.drain_events("output").await.iter().map(|e| e.seq).collect();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(router.backlog_len("output").await, 0);
        assert_eq!(router.backlog_len("stopped").await, 1);
        assert!(router.drain_events("output").await.is_empty());
    }

    #[tokio::test]
    async fn router_responses_match_out_of_order() {
        let router = Arc::new(MessageRouter::new());
        let mut waiters = Vec::new();
        for seq in 1..=3 {
            let router = Arc::clone(&router);
            waiters.push(tokio::spawn(async move {
                router.wait_for_response(seq, Duration::from_secs(5)).await
            }));
        }
        wait_for_pending(&router, 3).await;

        for seq in [3, 1, 2] {
            router.on_message(response(seq, true)).await;
        }
        for (i, waiter) in waiters.into_iter().enumerate() {
            assert_eq!(waiter.await.unwrap().unwrap().request_seq, i as i64 + 1);
        }
    }
}
