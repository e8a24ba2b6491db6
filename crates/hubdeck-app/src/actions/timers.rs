//! Timer tasks that feed ticks back into the message loop

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use hubdeck_core::prelude::*;

use crate::message::Message;

/// Broker reconnect supervisor period
pub const RECONNECT_PERIOD: Duration = Duration::from_secs(5);

/// Send `ReconnectTick` every `period` until shutdown
pub fn spawn_reconnect_ticker(
    msg_tx: mpsc::Sender<Message>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if msg_tx.send(Message::ReconnectTick).await.is_err() {
                        break;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        trace!("Reconnect ticker stopped");
    })
}

/// Close discovery pass `pass` after `window`
pub fn spawn_discovery_window(msg_tx: mpsc::Sender<Message>, pass: u64, window: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(window).await;
        let _ = msg_tx.send(Message::DiscoveryWindowElapsed { pass }).await;
    });
}

/// Holds the liveness ticker of the one open session
///
/// Arming replaces any previous ticker, so at most one runs at a time.
#[derive(Debug, Clone, Default)]
pub struct LivenessSlot(Arc<Mutex<Option<JoinHandle<()>>>>);

impl LivenessSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking `LivenessTick { generation }` every `period`
    pub fn arm(&self, msg_tx: mpsc::Sender<Message>, generation: u64, period: Duration) {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if msg_tx.send(Message::LivenessTick { generation }).await.is_err() {
                    break;
                }
            }
        });

        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    pub fn disarm(&self) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        let slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().is_some_and(|h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discovery_window_fires_once() {
        let (tx, mut rx) = mpsc::channel(4);
        spawn_discovery_window(tx, 3, Duration::from_millis(10));

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(msg, Some(Message::DiscoveryWindowElapsed { pass: 3 }));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reconnect_ticker_stops_on_shutdown() {
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_reconnect_ticker(tx, Duration::from_millis(10), shutdown_rx);

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(msg, Some(Message::ReconnectTick));

        tokio_test::assert_ok!(shutdown_tx.send(true));
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_rearming_replaces_previous_ticker() {
        let (tx, mut rx) = mpsc::channel(16);
        let slot = LivenessSlot::new();

        slot.arm(tx.clone(), 1, Duration::from_millis(10));
        slot.arm(tx, 2, Duration::from_millis(10));
        assert!(slot.is_armed());

        for _ in 0..3 {
            let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap();
            assert_eq!(msg, Some(Message::LivenessTick { generation: 2 }));
        }

        slot.disarm();
        assert!(!slot.is_armed());
    }
}
