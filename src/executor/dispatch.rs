//! Per-command tasks.
//!
//! Each inbound command runs in its own task so results may complete out
//! of order. A task emits its result only if it still owns the pending
//! entry; once the bridge detaches the entry is rejected and the task
//! stays silent.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::Error;
use crate::identifiers::{RequestId, TabId};
use crate::protocol::{Command, CommandKind, CommandResult, ExecutorMessage};
use crate::transport::BridgeSender;

use super::paste::paste_command;
use super::pending::{PendingKind, PendingReply, PendingRequests};
use super::screenshot::screenshot_command;
use super::script::{ScriptEvaluator, evaluate_command};

// ============================================================================
// CommandContext
// ============================================================================

/// Everything a command task needs.
#[derive(Clone)]
pub(crate) struct CommandContext {
    pub tab_id: TabId,
    pub bridge: BridgeSender,
    pub evaluator: Arc<dyn ScriptEvaluator>,
    pub pending: Arc<PendingRequests>,
    pub pending_timeout: Duration,
}

impl CommandContext {
    /// Registers `command` and spawns its task.
    ///
    /// A duplicate `requestId` is answered immediately with a failure
    /// result; the request already in flight is untouched.
    pub fn spawn(&self, command: Command) {
        let request_id = command.request_id().clone();
        let kind = match command.kind() {
            CommandKind::CaptureElementsScreenshot => PendingKind::Screenshot,
            CommandKind::EvaluateScript | CommandKind::PasteData => PendingKind::Evaluation,
        };

        match self.pending.register(request_id.clone(), kind) {
            Ok(reply) => {
                tokio::spawn(self.clone().run(command, reply));
            }
            Err(e) => {
                warn!(%request_id, "Duplicate request id in flight");
                self.emit(CommandResult::failure(command.kind(), request_id, e.reason()));
            }
        }
    }

    /// Sends a result to the controller.
    pub fn emit(&self, result: CommandResult) {
        let request_id = result.request_id().clone();
        let message = ExecutorMessage::ForwardToLink {
            payload: result.to_value(),
        };

        match self.bridge.post(message) {
            Ok(()) => debug!(%request_id, failed = result.is_failure(), "Result sent"),
            Err(e) => warn!(%request_id, error = %e, "Result dropped, bridge detached"),
        }
    }

    async fn run(self, command: Command, reply: oneshot::Receiver<PendingReply>) {
        let kind = command.kind();
        let request_id = command.request_id().clone();

        let outcome = match command {
            Command::EvaluateScript { script, .. } => {
                let work = evaluate_command(self.evaluator.as_ref(), request_id.clone(), &script);
                self.guard(kind, &request_id, reply, work).await
            }
            Command::PasteData {
                selector, data_url, ..
            } => {
                let work = paste_command(
                    self.evaluator.as_ref(),
                    request_id.clone(),
                    &selector,
                    &data_url,
                );
                self.guard(kind, &request_id, reply, work).await
            }
            Command::CaptureElementsScreenshot { selectors, .. } => {
                screenshot_command(&self, request_id.clone(), &selectors, reply).await
            }
        };

        match outcome {
            Some(result) => self.emit(result),
            None => debug!(%request_id, "Request rejected, no result emitted"),
        }
    }

    /// Runs `work` under the pending timeout, unless rejected first.
    async fn guard<F>(
        &self,
        kind: CommandKind,
        request_id: &RequestId,
        reply: oneshot::Receiver<PendingReply>,
        work: F,
    ) -> Option<CommandResult>
    where
        F: Future<Output = CommandResult>,
    {
        let finished = tokio::select! {
            finished = timeout(self.pending_timeout, work) => finished,
            _ = reply => return None,
        };

        if !self.pending.remove(request_id) {
            return None;
        }

        Some(finished.unwrap_or_else(|_| {
            let timeout_ms = self.pending_timeout.as_millis() as u64;
            warn!(%request_id, timeout_ms, "Request timed out");
            CommandResult::failure(
                kind,
                request_id.clone(),
                Error::request_timeout(request_id.clone(), timeout_ms).reason(),
            )
        }))
    }
}
