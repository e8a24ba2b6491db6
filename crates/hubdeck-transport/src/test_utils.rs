//! Test utilities: an adapter that records calls and replays scripted replies
//!
//! Lets orchestrator tests drive a full engine without sockets or a broker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use hubdeck_core::prelude::*;
use hubdeck_core::{ConnectionKind, DeviceId, DiscoverReply, Inbound};

use crate::adapter::{DeviceTarget, DiscoverRequest, Query, TransportAdapter};
use crate::events::TransportEvent;
use crate::set::{Adapter, AdapterSet};

/// One recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: ConnectionKind,
    pub op: &'static str,
    pub device: Option<DeviceId>,
}

/// Shared, ordered log of adapter calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<RecordedCall>>>);

impl CallLog {
    fn push(&self, kind: ConnectionKind, op: &'static str, device: Option<&str>) {
        let mut calls = self.0.lock().unwrap_or_else(|e| e.into_inner());
        calls.push(RecordedCall {
            kind,
            op,
            device: device.map(str::to_string),
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Operation names in call order, as `"{KIND}:{op}"`
    pub fn ops(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|c| format!("{}:{}", c.kind, c.op))
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Adapter that records every call and answers discovery from a script
#[derive(Debug, Clone)]
pub struct RecordingAdapter {
    kind: ConnectionKind,
    log: CallLog,
    events: mpsc::Sender<TransportEvent>,
    replies: Arc<Mutex<Vec<DiscoverReply>>>,
    broker_online: bool,
    next_link: Arc<AtomicU64>,
}

impl RecordingAdapter {
    pub fn new(kind: ConnectionKind, log: CallLog, events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            kind,
            log,
            events,
            replies: Arc::new(Mutex::new(Vec::new())),
            broker_online: false,
            next_link: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Reply with `reply` to every discovery request
    pub fn with_reply(self, reply: DiscoverReply) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(reply);
        self
    }

    /// Report the broker as connected as soon as it is started
    pub fn with_broker_online(mut self, online: bool) -> Self {
        self.broker_online = online;
        self
    }

    pub(crate) async fn start_broker(&self) -> u64 {
        self.log.push(self.kind, "start_broker", None);
        let link = self.next_link.fetch_add(1, Ordering::SeqCst);
        if self.broker_online {
            let _ = self
                .events
                .send(TransportEvent::BrokerConnected { link })
                .await;
        }
        link
    }

    pub(crate) fn stop_broker(&self) {
        self.log.push(self.kind, "stop_broker", None);
    }
}

impl TransportAdapter for RecordingAdapter {
    fn kind(&self) -> ConnectionKind {
        self.kind
    }

    async fn connect(&self, target: &DeviceTarget) -> Result<()> {
        self.log.push(self.kind, "connect", Some(&target.id));
        Ok(())
    }

    async fn disconnect(&self, target: &DeviceTarget) -> Result<()> {
        self.log.push(self.kind, "disconnect", Some(&target.id));
        Ok(())
    }

    async fn send_focus(&self, target: &DeviceTarget) -> Result<()> {
        self.log.push(self.kind, "send_focus", Some(&target.id));
        Ok(())
    }

    async fn send_unfocus(&self, target: &DeviceTarget) -> Result<()> {
        self.log.push(self.kind, "send_unfocus", Some(&target.id));
        Ok(())
    }

    async fn discover(&self, _request: &DiscoverRequest) -> Result<()> {
        self.log.push(self.kind, "discover", None);
        let replies = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for reply in replies {
            let _ = self
                .events
                .send(TransportEvent::Received {
                    kind: self.kind,
                    message: Inbound::Discover(reply),
                })
                .await;
        }
        Ok(())
    }

    async fn query_state(&self, target: &DeviceTarget, query: &Query) -> Result<()> {
        let op = match query {
            Query::Focus => "query_focus",
            Query::Info => "query_info",
            Query::Fsbr => "query_fsbr",
            Query::Ping => "query_ping",
            Query::Cli(_) => "query_cli",
        };
        self.log.push(self.kind, op, Some(&target.id));
        Ok(())
    }
}

impl AdapterSet {
    /// Every kind backed by a [`RecordingAdapter`] sharing one log
    pub fn recording(log: CallLog, events: mpsc::Sender<TransportEvent>) -> Self {
        let make = |kind| Adapter::Recording(RecordingAdapter::new(kind, log.clone(), events.clone()));
        Self::from_adapters(
            make(ConnectionKind::WebSocket),
            make(ConnectionKind::Mqtt),
            make(ConnectionKind::Bluetooth),
            make(ConnectionKind::Serial),
        )
    }
}
