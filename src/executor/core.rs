//! Executor event loop.
//!
//! One executor per inspected tab. A spawned task owns the bridge, the
//! reconnect timer and the session state; everything else talks to it
//! through an [`ExecutorHandle`].
//!
//! ```text
//! ExecutorHandle ──commands──►┌──────────┐◄── LINK_STATUS / LINK_MESSAGE
//!                             │ Executor │        TAB_CAPTURE_COMPLETE / BRIDGE_DETACHED
//! watch<SessionStatus> ◄──────└──────────┘──► CONNECT_LINK / FORWARD_TO_LINK ...
//!                                  │
//!                                  └──► one task per command
//! ```
//!
//! A closed bridge is treated as transient: the executor attaches a fresh
//! one on its next reconnect. `BRIDGE_DETACHED` is final and stops the
//! executor with [`SessionStatus::Detached`].

// ============================================================================
// Imports
// ============================================================================

use std::future::pending as never;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Sleep, sleep};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ChannelName, RequestId, TabId};
use crate::protocol::{DetachReason, ExecutorMessage, Inbound, LinkStatus, SupervisorMessage};
use crate::relay::RelayOptions;
use crate::supervisor::SupervisorHandle;
use crate::transport::{BridgeSender, ExecutorPort};

use super::dispatch::CommandContext;
use super::pending::PendingRequests;
use super::reconnect::ReconnectPolicy;
use super::script::ScriptEvaluator;
use super::session::{ExecutorState, SessionStatus};

// ============================================================================
// Constants
// ============================================================================

/// Rejection reason when the bridge goes away.
const BRIDGE_CLOSED: &str = "bridge channel closed";

/// Rejection reason when the executor stops.
const EXECUTOR_STOPPED: &str = "executor stopped";

// ============================================================================
// ExecutorCommand
// ============================================================================

/// Request from an [`ExecutorHandle`].
enum ExecutorCommand {
    Connect(ChannelName),
    Disconnect,
    State(oneshot::Sender<ExecutorState>),
    Detach(oneshot::Sender<()>),
}

impl std::fmt::Debug for ExecutorCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(channel) => f.debug_tuple("Connect").field(channel).finish(),
            Self::Disconnect => f.write_str("Disconnect"),
            Self::State(_) => f.write_str("State"),
            Self::Detach(_) => f.write_str("Detach"),
        }
    }
}

// ============================================================================
// ExecutorHandle
// ============================================================================

/// Handle to a running executor.
#[derive(Debug, Clone)]
pub struct ExecutorHandle {
    tab_id: TabId,
    command_tx: mpsc::UnboundedSender<ExecutorCommand>,
    status_rx: watch::Receiver<SessionStatus>,
}

impl ExecutorHandle {
    /// Returns the tab this executor serves.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Connects the session to `channel` (user-initiated).
    ///
    /// Resets reconnect attempts and re-enables automatic reconnects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a blank channel name, or
    /// [`Error::ChannelDetached`] if the executor has stopped.
    pub fn connect(&self, channel: impl AsRef<str>) -> Result<()> {
        let channel = ChannelName::new(channel)
            .ok_or_else(|| Error::invalid_argument("channel name must not be empty"))?;
        self.send(ExecutorCommand::Connect(channel))
    }

    /// Disconnects the session (user-initiated).
    ///
    /// Suppresses automatic reconnects until the next [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelDetached`] if the executor has stopped.
    pub fn disconnect(&self) -> Result<()> {
        self.send(ExecutorCommand::Disconnect)
    }

    /// Returns the current session status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    /// Returns a receiver for session status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Waits until the session status satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelDetached`] if the executor stops first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionStatus) -> bool,
    ) -> Result<SessionStatus> {
        let mut status_rx = self.status_rx.clone();
        let status = status_rx
            .wait_for(predicate)
            .await
            .map_err(|_| Error::channel_detached(EXECUTOR_STOPPED))?;
        Ok(status.clone())
    }

    /// Returns a snapshot of the executor's state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelDetached`] if the executor has stopped.
    pub async fn state(&self) -> Result<ExecutorState> {
        let (reply, rx) = oneshot::channel();
        self.send(ExecutorCommand::State(reply))?;
        rx.await
            .map_err(|_| Error::channel_detached(EXECUTOR_STOPPED))
    }

    /// Stops the executor and detaches its bridge.
    ///
    /// Pending requests are rejected; the control link stays open.
    pub async fn detach(&self) {
        let (ack, rx) = oneshot::channel();
        if self.send(ExecutorCommand::Detach(ack)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Returns `true` while the executor is running.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }

    fn send(&self, command: ExecutorCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::channel_detached(EXECUTOR_STOPPED))
    }
}

// ============================================================================
// Executor
// ============================================================================

/// In-page command executor for one tab.
pub struct Executor {
    tab_id: TabId,
    supervisor: SupervisorHandle,
    evaluator: Arc<dyn ScriptEvaluator>,
    pending: Arc<PendingRequests>,
    pending_timeout: Duration,
    policy: ReconnectPolicy,
    bridge: Option<BridgeSender>,
    inbound: Option<mpsc::UnboundedReceiver<SupervisorMessage>>,
    /// At most one timer is armed; re-arming drops the previous one.
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    status_tx: watch::Sender<SessionStatus>,
    command_rx: mpsc::UnboundedReceiver<ExecutorCommand>,
}

impl Executor {
    /// Spawns an executor on an attached bridge port.
    ///
    /// `supervisor` is used to attach a fresh bridge if this one is lost.
    #[must_use]
    pub fn spawn(
        port: ExecutorPort,
        supervisor: SupervisorHandle,
        evaluator: Arc<dyn ScriptEvaluator>,
        options: &RelayOptions,
    ) -> ExecutorHandle {
        let tab_id = port.tab_id();
        let (bridge, inbound) = port.split();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Idle);

        let executor = Self {
            tab_id,
            supervisor,
            evaluator,
            pending: Arc::new(PendingRequests::new()),
            pending_timeout: options.pending_timeout,
            policy: ReconnectPolicy::from_options(options),
            bridge: Some(bridge),
            inbound: Some(inbound),
            reconnect_timer: None,
            status_tx,
            command_rx,
        };

        tokio::spawn(executor.run());

        ExecutorHandle {
            tab_id,
            command_tx,
            status_rx,
        }
    }

    async fn run(mut self) {
        debug!(tab_id = %self.tab_id, "Executor event loop started");

        loop {
            tokio::select! {
                // Messages from the supervisor
                message = recv_bridge(&mut self.inbound) => {
                    match message {
                        Some(message) => {
                            if self.handle_supervisor_message(message).is_break() {
                                break;
                            }
                        }
                        None => self.handle_bridge_lost(),
                    }
                }

                // Requests from handles
                command = self.command_rx.recv() => {
                    match command {
                        Some(ExecutorCommand::Connect(channel)) => self.connect(channel),
                        Some(ExecutorCommand::Disconnect) => self.disconnect(),
                        Some(ExecutorCommand::State(reply)) => {
                            let _ = reply.send(self.state());
                        }
                        Some(ExecutorCommand::Detach(ack)) => {
                            self.teardown();
                            let _ = ack.send(());
                            break;
                        }
                        None => {
                            self.teardown();
                            break;
                        }
                    }
                }

                // Reconnect timer
                () = fire(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.reconnect();
                }
            }
        }

        debug!(tab_id = %self.tab_id, "Executor event loop terminated");
    }

    fn state(&self) -> ExecutorState {
        ExecutorState {
            attempts: self.policy.attempts(),
            channel: self.policy.channel().cloned(),
            pending: self.pending.len(),
            oldest_pending: self.pending.oldest_age(),
            bridge_attached: self.bridge.is_some(),
            reconnect_scheduled: self.reconnect_timer.is_some(),
        }
    }

    fn publish(&self, status: SessionStatus) {
        debug!(tab_id = %self.tab_id, %status, "Session status");
        self.status_tx.send_replace(status);
    }
}

// ============================================================================
// Supervisor Messages
// ============================================================================

impl Executor {
    /// Breaks once the supervisor has released the bridge.
    fn handle_supervisor_message(&mut self, message: SupervisorMessage) -> ControlFlow<()> {
        match message {
            SupervisorMessage::LinkStatus {
                status,
                channel_name,
            } => self.handle_link_status(status, channel_name),
            SupervisorMessage::LinkMessage { data } => self.handle_frame(&data),
            SupervisorMessage::TabCaptureComplete {
                request_id,
                data_url,
                error,
            } => self.handle_capture_complete(request_id, data_url, error),
            SupervisorMessage::BridgeDetached { reason } => {
                self.handle_released(reason);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_link_status(&mut self, status: LinkStatus, channel_name: Option<ChannelName>) {
        if let (Some(reported), Some(current)) = (&channel_name, self.policy.channel())
            && reported != current
        {
            debug!(tab_id = %self.tab_id, %reported, %current, "Ignoring status for other channel");
            return;
        }

        match status {
            LinkStatus::Connected => {
                self.policy.on_connected();
                self.cancel_reconnect();
                if let Some(channel) = channel_name.or_else(|| self.policy.channel().cloned()) {
                    info!(tab_id = %self.tab_id, %channel, "Session connected");
                    self.publish(SessionStatus::Connected { channel });
                }
            }
            LinkStatus::Disconnected { .. } | LinkStatus::Error { .. } => {
                let user_initiated = self.policy.is_user_disconnect();
                self.policy.on_link_down();
                self.publish(match status {
                    LinkStatus::Error { reason } => SessionStatus::Error(reason),
                    _ => SessionStatus::Disconnected,
                });
                if !user_initiated {
                    self.schedule_reconnect();
                }
            }
            LinkStatus::NotConnected => {
                self.policy.on_link_down();
                self.publish(SessionStatus::Disconnected);
            }
        }
    }

    fn handle_frame(&self, data: &Value) {
        let Some(ctx) = self.context() else {
            warn!(tab_id = %self.tab_id, "Frame received without a bridge");
            return;
        };

        match Inbound::parse(data) {
            Inbound::Command(command) => {
                debug!(
                    tab_id = %self.tab_id,
                    kind = %command.kind(),
                    request_id = %command.request_id(),
                    "Command received"
                );
                ctx.spawn(command);
            }
            Inbound::Malformed(malformed) => {
                warn!(
                    tab_id = %self.tab_id,
                    kind = %malformed.kind,
                    message = %malformed.message,
                    "Malformed command"
                );
                ctx.emit(malformed.into_result());
            }
            Inbound::Unknown { kind } => {
                warn!(tab_id = %self.tab_id, ?kind, "Unhandled message type from controller");
            }
        }
    }

    fn handle_capture_complete(
        &self,
        request_id: RequestId,
        data_url: Option<String>,
        error: Option<String>,
    ) {
        let reply = match (data_url, error) {
            (_, Some(error)) => Err(Error::capture_failed(self.tab_id, error)),
            (Some(data_url), None) if !data_url.is_empty() => Ok(data_url),
            _ => Err(Error::capture_failed(
                self.tab_id,
                "Supervisor did not return a dataUrl for tab capture.",
            )),
        };

        if !self.pending.resolve(&request_id, reply) {
            warn!(tab_id = %self.tab_id, %request_id, "Capture result for unknown request");
        }
    }

    fn context(&self) -> Option<CommandContext> {
        Some(CommandContext {
            tab_id: self.tab_id,
            bridge: self.bridge.clone()?,
            evaluator: Arc::clone(&self.evaluator),
            pending: Arc::clone(&self.pending),
            pending_timeout: self.pending_timeout,
        })
    }
}

// ============================================================================
// Session Control
// ============================================================================

impl Executor {
    fn connect(&mut self, channel: ChannelName) {
        info!(tab_id = %self.tab_id, %channel, "Connect requested");
        self.cancel_reconnect();
        self.policy.user_connect(channel);
        self.send_connect(SessionStatus::Connecting);
    }

    fn disconnect(&mut self) {
        self.cancel_reconnect();

        let sent = match (self.policy.user_disconnect(), &self.bridge) {
            (Some(channel_name), Some(bridge)) => {
                info!(tab_id = %self.tab_id, channel = %channel_name, "Disconnect requested");
                bridge
                    .post(ExecutorMessage::DisconnectLink { channel_name })
                    .is_ok()
            }
            _ => false,
        };

        if !sent {
            self.policy.on_link_down();
            self.publish(SessionStatus::Disconnected);
        }
    }

    fn reconnect(&mut self) {
        let attempt = self.policy.attempts();
        info!(tab_id = %self.tab_id, attempt, "Reconnecting");
        self.send_connect(SessionStatus::Reconnecting { attempt });
    }

    fn send_connect(&mut self, status: SessionStatus) {
        let Some(channel_name) = self.policy.channel().cloned() else {
            return;
        };

        let posted = self
            .ensure_bridge()
            .and_then(|bridge| bridge.post(ExecutorMessage::ConnectLink { channel_name }));

        match posted {
            Ok(()) => self.publish(status),
            Err(e) => {
                error!(tab_id = %self.tab_id, error = %e, "Cannot reach supervisor");
                self.publish(SessionStatus::Error(e.reason()));
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        let Some(next) = self.policy.next_attempt() else {
            debug!(tab_id = %self.tab_id, "Automatic reconnect not allowed");
            return;
        };

        info!(
            tab_id = %self.tab_id,
            attempt = next.attempt,
            delay_ms = next.delay.as_millis() as u64,
            "Reconnect scheduled"
        );
        self.reconnect_timer = Some(Box::pin(sleep(next.delay)));
        self.publish(SessionStatus::WaitingToReconnect {
            attempt: next.attempt,
            delay: next.delay,
        });
    }

    #[inline]
    fn cancel_reconnect(&mut self) {
        self.reconnect_timer = None;
    }
}

// ============================================================================
// Bridge Lifecycle
// ============================================================================

impl Executor {
    fn handle_bridge_lost(&mut self) {
        let rejected = self.drop_bridge(BRIDGE_CLOSED);
        warn!(tab_id = %self.tab_id, rejected, "Bridge to supervisor lost");
        self.publish(SessionStatus::BridgeLost);
        self.schedule_reconnect();
    }

    /// The supervisor will not serve this executor again.
    fn handle_released(&mut self, reason: DetachReason) {
        self.cancel_reconnect();
        let rejected = self.drop_bridge(&reason.to_string());
        info!(tab_id = %self.tab_id, %reason, rejected, "Bridge released by supervisor");
        self.publish(SessionStatus::Detached(reason));
    }

    /// Returns the live bridge, attaching a fresh one if needed.
    fn ensure_bridge(&mut self) -> Result<BridgeSender> {
        if let Some(bridge) = &self.bridge {
            if !bridge.is_closed() {
                return Ok(bridge.clone());
            }
            self.drop_bridge(BRIDGE_CLOSED);
        }

        let (bridge, inbound) = self.supervisor.attach(self.tab_id)?.split();
        info!(tab_id = %self.tab_id, "Bridge re-attached");

        self.bridge = Some(bridge.clone());
        self.inbound = Some(inbound);
        Ok(bridge)
    }

    /// Drops the bridge and rejects everything in flight.
    fn drop_bridge(&mut self, reason: &str) -> usize {
        self.bridge = None;
        self.inbound = None;
        self.pending.reject_all(reason)
    }

    fn teardown(&mut self) {
        self.cancel_reconnect();
        let rejected = self.drop_bridge(EXECUTOR_STOPPED);
        info!(tab_id = %self.tab_id, rejected, "Executor detached");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

async fn recv_bridge(
    inbound: &mut Option<mpsc::UnboundedReceiver<SupervisorMessage>>,
) -> Option<SupervisorMessage> {
    match inbound {
        Some(inbound) => inbound.recv().await,
        None => never().await,
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => never().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use async_trait::async_trait;
    use image::{ImageFormat, Rgba, RgbaImage};
    use serde_json::json;
    use tokio::time::timeout;

    use crate::executor::script::Evaluation;
    use crate::protocol::DataUrl;
    use crate::identifiers::WindowId;
    use crate::supervisor::{Supervisor, SurfaceCapture};
    use crate::transport::{BridgeChannel, SupervisorEnd, WsConnector};

    // ------------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------------

    /// Answers `1+1`, throws on `throw`, hangs on `hang`, measures `#present`.
    struct PageEvaluator;

    #[async_trait]
    impl ScriptEvaluator for PageEvaluator {
        async fn evaluate(&self, source: &str) -> Result<Evaluation> {
            if source.contains("hang") {
                never::<()>().await;
            }
            if source.contains("throw") {
                return Ok(Evaluation::exception(
                    json!({"isException": true, "value": "Error: x"}),
                ));
            }
            if source.contains("getBoundingClientRect") {
                return Ok(Evaluation::value(json!({
                    "#present": {"x": 0, "y": 0, "width": 2, "height": 2, "top": 0, "left": 0, "devicePixelRatio": 1},
                    "#absent": null
                })));
            }
            Ok(Evaluation::value(json!(2)))
        }
    }

    struct NoCapture;

    #[async_trait]
    impl SurfaceCapture for NoCapture {
        async fn window_of(&self, _tab_id: TabId) -> Result<WindowId> {
            Err(Error::invalid_argument("no windows in tests"))
        }

        async fn capture_visible(&self, _window_id: WindowId) -> Result<Option<String>> {
            Ok(None)
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn tab() -> TabId {
        TabId::new(3).expect("valid tab id")
    }

    fn options() -> RelayOptions {
        RelayOptions::new()
            .with_reconnect_backoff(Duration::from_millis(50), Duration::from_millis(400))
            .with_pending_timeout(Duration::from_millis(300))
    }

    /// Executor wired to a raw bridge end driven by the test.
    fn start(options: &RelayOptions) -> (ExecutorHandle, SupervisorEnd, SupervisorHandle) {
        let supervisor = Supervisor::spawn(options.clone(), Arc::new(WsConnector), Arc::new(NoCapture));
        let (end, port) = BridgeChannel::pair(tab());
        let handle = Executor::spawn(port, supervisor.clone(), Arc::new(PageEvaluator), options);
        (handle, end, supervisor)
    }

    async fn next(end: &mut SupervisorEnd) -> ExecutorMessage {
        timeout(Duration::from_secs(2), end.rx.recv())
            .await
            .expect("message in time")
            .expect("bridge open")
    }

    async fn next_result(end: &mut SupervisorEnd) -> Value {
        match next(end).await {
            ExecutorMessage::ForwardToLink { payload } => payload,
            other => panic!("expected result, got {other:?}"),
        }
    }

    fn frame(end: &SupervisorEnd, data: Value) {
        end.tx
            .send(SupervisorMessage::LinkMessage { data })
            .expect("executor alive");
    }

    fn status(end: &SupervisorEnd, status: LinkStatus, channel: &str) {
        end.tx
            .send(SupervisorMessage::status(status, ChannelName::new(channel)))
            .expect("executor alive");
    }

    fn png() -> String {
        let image = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode");
        DataUrl::png(&bytes)
    }

    async fn wait(handle: &ExecutorHandle, predicate: impl FnMut(&SessionStatus) -> bool) -> SessionStatus {
        timeout(Duration::from_secs(2), handle.wait_for(predicate))
            .await
            .expect("status in time")
            .expect("executor alive")
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_evaluate_script() {
        let (_handle, mut end, _supervisor) = start(&options());

        frame(&end, json!({"type": "EVALUATE_SCRIPT", "requestId": "r1", "script": "1+1"}));
        let result = next_result(&mut end).await;
        assert_eq!(
            result,
            json!({
                "type": "EVALUATION_RESULT",
                "requestId": "r1",
                "result": 2,
                "isException": false,
                "exceptionInfo": null
            })
        );

        frame(&end, json!({"type": "EVALUATE_SCRIPT", "requestId": "r2", "script": "throw new Error('x')"}));
        let result = next_result(&mut end).await;
        assert_eq!(result["isException"], json!(true));
        assert_eq!(result["exceptionInfo"], json!("Error: x"));
    }

    #[tokio::test]
    async fn test_malformed_command_is_answered() {
        let (_handle, mut end, _supervisor) = start(&options());

        frame(&end, json!({"type": "EVALUATE_SCRIPT", "script": 5}));
        let result = next_result(&mut end).await;
        assert_eq!(result["requestId"], json!("unknown"));
        assert_eq!(result["isException"], json!(true));

        frame(&end, json!({"type": "CAPTURE_ELEMENTS_SCREENSHOT", "requestId": "s0", "selectors": []}));
        let result = next_result(&mut end).await;
        assert_eq!(result["imageData"], json!({}));
        assert_eq!(
            result["error"],
            json!("Invalid CAPTURE_ELEMENTS_SCREENSHOT request structure or empty selectors.")
        );
    }

    #[tokio::test]
    async fn test_unknown_type_is_ignored() {
        let (handle, end, _supervisor) = start(&options());
        frame(&end, json!({"type": "PING"}));
        assert_eq!(handle.state().await.expect("running").pending, 0);
    }

    #[tokio::test]
    async fn test_duplicate_request_id() {
        let (handle, mut end, _supervisor) = start(&options());

        frame(&end, json!({"type": "EVALUATE_SCRIPT", "requestId": "d1", "script": "hang()"}));
        frame(&end, json!({"type": "EVALUATE_SCRIPT", "requestId": "d1", "script": "1+1"}));

        let result = next_result(&mut end).await;
        assert_eq!(result["requestId"], json!("d1"));
        assert_eq!(result["exceptionInfo"], json!("Request d1 is already in flight"));
        assert_eq!(handle.state().await.expect("running").pending, 1);

        // The original request still resolves, by timeout.
        let result = next_result(&mut end).await;
        assert_eq!(result["requestId"], json!("d1"));
        assert_eq!(result["exceptionInfo"], json!("Request d1 timed out after 300ms"));
        assert_eq!(handle.state().await.expect("running").pending, 0);
    }

    #[tokio::test]
    async fn test_screenshot_pipeline() {
        let (handle, mut end, _supervisor) = start(&options());

        frame(&end, json!({
            "type": "CAPTURE_ELEMENTS_SCREENSHOT",
            "requestId": "r3",
            "selectors": ["#present", "#absent"]
        }));

        let request = next(&mut end).await;
        assert_eq!(
            request,
            ExecutorMessage::RequestTabCapture {
                tab_id: tab(),
                request_id: RequestId::new("r3"),
            }
        );
        assert_eq!(handle.state().await.expect("running").pending, 1);

        end.tx
            .send(SupervisorMessage::TabCaptureComplete {
                request_id: RequestId::new("r3"),
                data_url: Some(png()),
                error: None,
            })
            .expect("executor alive");

        let result = next_result(&mut end).await;
        assert_eq!(result["type"], json!("ELEMENTS_SCREENSHOT_RESULT"));
        assert_eq!(result["error"], Value::Null);
        assert_eq!(result["imageData"]["#absent"], Value::Null);
        assert!(
            result["imageData"]["#present"]
                .as_str()
                .is_some_and(|url| url.starts_with("data:image/png;base64,"))
        );
    }

    #[tokio::test]
    async fn test_screenshot_capture_failure() {
        let (_handle, mut end, _supervisor) = start(&options());

        frame(&end, json!({
            "type": "CAPTURE_ELEMENTS_SCREENSHOT",
            "requestId": "r5",
            "selectors": ["#present"]
        }));
        next(&mut end).await;

        end.tx
            .send(SupervisorMessage::TabCaptureComplete {
                request_id: RequestId::new("r5"),
                data_url: None,
                error: Some("captureVisibleTab returned empty dataUrl.".to_string()),
            })
            .expect("executor alive");

        let result = next_result(&mut end).await;
        assert_eq!(result["imageData"], json!({}));
        assert_eq!(result["error"], json!("captureVisibleTab returned empty dataUrl."));
    }

    #[tokio::test]
    async fn test_detach_during_capture_rejects_pending() {
        let (handle, mut end, _supervisor) = start(&options());

        frame(&end, json!({
            "type": "CAPTURE_ELEMENTS_SCREENSHOT",
            "requestId": "r6",
            "selectors": ["#present"]
        }));
        next(&mut end).await;
        assert_eq!(handle.state().await.expect("running").pending, 1);

        drop(end);

        wait(&handle, |status| *status == SessionStatus::BridgeLost).await;
        let state = handle.state().await.expect("running");
        assert_eq!(state.pending, 0);
        assert!(!state.bridge_attached);
        // No channel was ever requested, so nothing to reconnect.
        assert!(!state.reconnect_scheduled);
    }

    // ------------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_connect_and_status() {
        let (handle, mut end, _supervisor) = start(&options());

        handle.connect("alpha").expect("running");
        assert_eq!(
            next(&mut end).await,
            ExecutorMessage::ConnectLink {
                channel_name: ChannelName::new("alpha").expect("valid name"),
            }
        );
        assert_eq!(handle.status(), SessionStatus::Connecting);

        status(&end, LinkStatus::Connected, "alpha");
        let connected = wait(&handle, SessionStatus::is_connected).await;
        assert_eq!(connected.to_string(), "Connected (alpha)");

        assert!(handle.connect("   ").is_err());
    }

    #[tokio::test]
    async fn test_link_loss_schedules_reconnect() {
        let (handle, mut end, _supervisor) = start(&options());

        handle.connect("alpha").expect("running");
        next(&mut end).await;

        status(&end, LinkStatus::Disconnected { was_clean: false }, "alpha");
        let waiting = wait(&handle, |s| matches!(s, SessionStatus::WaitingToReconnect { .. })).await;
        assert_eq!(
            waiting,
            SessionStatus::WaitingToReconnect {
                attempt: 1,
                delay: Duration::from_millis(50),
            }
        );

        // Timer fires and asks for the same channel again.
        assert!(matches!(next(&mut end).await, ExecutorMessage::ConnectLink { .. }));
        wait(&handle, |s| *s == SessionStatus::Reconnecting { attempt: 1 }).await;

        status(&end, LinkStatus::error("connection refused"), "alpha");
        let waiting = wait(&handle, |s| matches!(s, SessionStatus::WaitingToReconnect { attempt: 2, .. })).await;
        assert_eq!(
            waiting,
            SessionStatus::WaitingToReconnect {
                attempt: 2,
                delay: Duration::from_millis(100),
            }
        );

        status(&end, LinkStatus::Connected, "alpha");
        wait(&handle, SessionStatus::is_connected).await;
        let state = handle.state().await.expect("running");
        assert_eq!(state.attempts, 0);
        assert!(!state.reconnect_scheduled);
    }

    #[tokio::test]
    async fn test_user_disconnect_suppresses_reconnect() {
        let (handle, mut end, _supervisor) = start(&options());

        handle.connect("alpha").expect("running");
        next(&mut end).await;
        status(&end, LinkStatus::Connected, "alpha");
        wait(&handle, SessionStatus::is_connected).await;

        handle.disconnect().expect("running");
        assert_eq!(
            next(&mut end).await,
            ExecutorMessage::DisconnectLink {
                channel_name: ChannelName::new("alpha").expect("valid name"),
            }
        );

        status(&end, LinkStatus::Disconnected { was_clean: true }, "alpha");
        wait(&handle, |s| *s == SessionStatus::Disconnected).await;

        let state = handle.state().await.expect("running");
        assert!(!state.reconnect_scheduled);
        assert!(state.channel.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_without_channel_is_local() {
        let (handle, _end, _supervisor) = start(&options());
        handle.disconnect().expect("running");
        wait(&handle, |s| *s == SessionStatus::Disconnected).await;
    }

    #[tokio::test]
    async fn test_status_for_other_channel_is_ignored() {
        let (handle, mut end, _supervisor) = start(&options());

        handle.connect("alpha").expect("running");
        next(&mut end).await;

        status(&end, LinkStatus::Disconnected { was_clean: false }, "beta");
        status(&end, LinkStatus::Connected, "alpha");
        wait(&handle, SessionStatus::is_connected).await;
        assert_eq!(handle.state().await.expect("running").attempts, 0);
    }

    #[tokio::test]
    async fn test_bridge_loss_reattaches_through_supervisor() {
        let (handle, mut end, supervisor) = start(&options());

        handle.connect("alpha").expect("running");
        next(&mut end).await;
        drop(end);

        // Reconnect attaches a fresh bridge to the supervisor.
        let mut attached = false;
        for _ in 0..100 {
            if let Some(snapshot) = supervisor.snapshot(tab()).await.expect("running")
                && snapshot.bridge_attached
            {
                attached = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(attached);
        assert!(handle.state().await.expect("running").bridge_attached);
    }

    #[tokio::test]
    async fn test_released_bridge_stops_executor() {
        let (handle, mut end, supervisor) = start(&options());

        handle.connect("alpha").expect("running");
        next(&mut end).await;
        status(&end, LinkStatus::Connected, "alpha");
        wait(&handle, SessionStatus::is_connected).await;

        frame(&end, json!({
            "type": "CAPTURE_ELEMENTS_SCREENSHOT",
            "requestId": "r7",
            "selectors": ["#present"]
        }));
        assert!(matches!(next(&mut end).await, ExecutorMessage::RequestTabCapture { .. }));

        end.tx
            .send(SupervisorMessage::detached(DetachReason::TabRemoved))
            .expect("executor alive");
        let detached = wait(&handle, SessionStatus::is_terminal).await;
        assert_eq!(detached, SessionStatus::Detached(DetachReason::TabRemoved));
        assert_eq!(detached.to_string(), "Detached: tab closed");

        assert!(handle.state().await.is_err());
        assert!(!handle.is_running());
        assert!(handle.connect("alpha").is_err());

        // The capture was dropped and nothing asks to connect again.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let closed = timeout(Duration::from_secs(2), end.rx.recv())
            .await
            .expect("closed in time");
        assert!(closed.is_none());
        assert!(supervisor.snapshot(tab()).await.expect("running").is_none());
        assert_eq!(handle.status(), SessionStatus::Detached(DetachReason::TabRemoved));
    }

    #[tokio::test]
    async fn test_replaced_executor_does_not_reattach() {
        let options = options();
        let supervisor = Supervisor::spawn(options.clone(), Arc::new(WsConnector), Arc::new(NoCapture));

        let first = Executor::spawn(
            supervisor.attach(tab()).expect("attach"),
            supervisor.clone(),
            Arc::new(PageEvaluator),
            &options,
        );
        let second = Executor::spawn(
            supervisor.attach(tab()).expect("attach"),
            supervisor.clone(),
            Arc::new(PageEvaluator),
            &options,
        );

        let released = wait(&first, SessionStatus::is_terminal).await;
        assert_eq!(released, SessionStatus::Detached(DetachReason::Replaced));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!first.is_running());
        let state = second.state().await.expect("running");
        assert!(state.bridge_attached);
        assert_eq!(second.status(), SessionStatus::Idle);
        let snapshot = supervisor.snapshot(tab()).await.expect("running").expect("known");
        assert!(snapshot.bridge_attached);
    }

    #[tokio::test]
    async fn test_detach_stops_executor() {
        let (handle, mut end, _supervisor) = start(&options());

        handle.detach().await;
        assert!(!handle.is_running());
        assert!(handle.state().await.is_err());

        let closed = timeout(Duration::from_secs(2), end.rx.recv())
            .await
            .expect("closed in time");
        assert!(closed.is_none());
    }
}
