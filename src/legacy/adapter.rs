//! Legacy command adapter.
//!
//! Flat commands such as `status(agent_7)` or `restart worker now` become
//! control series addressed to one target. Callers get the legacy
//! `(status, payload)` pair back once the router reaches a terminal state,
//! and every failure is reported as a [`LegacyError`].

use crate::codec::{BinaryCodec, PolicyFlags, SessionEncoder};
use crate::core::{PriorityClass, RejectReason, RoutingError, RoutingMetadata, SessionId, TargetId};
use crate::routing::{RouteRequest, RoutingEnvelope, TierRouter};
use crate::symbolic::{ControlFrame, NumericSeries};
use base64::Engine;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// Legacy status codes.
pub mod codes {
    pub const OK: u16 = 200;
    pub const BAD_COMMAND: u16 = 400;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const TIMEOUT: u16 = 408;
    pub const INTERNAL: u16 = 500;
    pub const UNAVAILABLE: u16 = 503;
}

/// The only error type legacy callers see.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code} {message}")]
pub struct LegacyError {
    pub code: u16,
    pub message: String,
}

impl LegacyError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<RoutingError> for LegacyError {
    fn from(err: RoutingError) -> Self {
        let code = match &err {
            RoutingError::Rejected { reason, .. } => match reason {
                RejectReason::NoEligibleTargets => codes::NOT_FOUND,
                RejectReason::PolicyDenied(_) => codes::FORBIDDEN,
                RejectReason::OutOfOrder { .. } => codes::UNAVAILABLE,
                RejectReason::Cancelled | RejectReason::Expired => codes::TIMEOUT,
                RejectReason::Duplicate => codes::BAD_COMMAND,
            },
            // targets answered but refused the command
            RoutingError::TimedOut { refused, .. } if *refused > 0 => codes::UNAVAILABLE,
            RoutingError::TimedOut { .. } => codes::TIMEOUT,
            RoutingError::Backpressure { .. } => codes::UNAVAILABLE,
        };
        LegacyError::new(code, err.to_string())
    }
}

/// A parsed flat command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyCommand {
    pub verb: String,
    pub args: Vec<String>,
}

impl LegacyCommand {
    /// Parse `verb(arg, ...)` or `verb arg ...`.
    pub fn parse(line: &str) -> Result<Self, LegacyError> {
        let line = line.trim();
        let (verb, args) = match line.find('(') {
            Some(open) => {
                let inner = line[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| LegacyError::new(codes::BAD_COMMAND, "unbalanced parentheses"))?;
                let args = inner
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect();
                (line[..open].trim(), args)
            }
            None => {
                let mut words = line.split_whitespace();
                let verb = words.next().unwrap_or("");
                (verb, words.map(String::from).collect())
            }
        };

        let valid = !verb.is_empty()
            && verb
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(LegacyError::new(
                codes::BAD_COMMAND,
                format!("invalid command verb {:?}", verb),
            ));
        }

        Ok(Self {
            verb: verb.to_string(),
            args,
        })
    }

    pub fn to_control_frame(&self) -> ControlFrame {
        ControlFrame::new(self.verb.clone(), self.args.clone())
    }
}

/// Result payload rendered for legacy callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LegacyPayload {
    Text(String),
    /// Non-UTF-8 payloads, base64 encoded
    Base64(String),
}

impl LegacyPayload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => LegacyPayload::Text(text.to_string()),
            Err(_) => LegacyPayload::Base64(base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LegacyPayload::Text(s) | LegacyPayload::Base64(s) => s,
        }
    }
}

impl fmt::Display for LegacyPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legacy `(status, payload)` response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyResponse {
    pub status: u16,
    pub payload: Option<LegacyPayload>,
}

/// Translates flat commands into routed control messages.
pub struct LegacyAdapter {
    router: Arc<TierRouter>,
    encoder: Mutex<SessionEncoder>,
}

impl LegacyAdapter {
    pub fn new(router: Arc<TierRouter>, codec: BinaryCodec) -> Self {
        Self::with_session(router, codec, SessionId::random())
    }

    pub fn with_session(router: Arc<TierRouter>, codec: BinaryCodec, session: SessionId) -> Self {
        Self {
            router,
            encoder: Mutex::new(SessionEncoder::new(codec, session)),
        }
    }

    /// Build the envelope for `command` addressed to `target`.
    ///
    /// The message travels on the target's own tier. Envelopes built here
    /// must be dispatched in the order they were translated.
    pub fn translate(&self, command: &str, target: &TargetId) -> Result<RoutingEnvelope, LegacyError> {
        let mut encoder = self.encoder();
        self.translate_with(&mut encoder, command, target)
    }

    /// Translate, dispatch and wait for the terminal state.
    ///
    /// Sequencing and dispatch happen under the encoder lock, so concurrent
    /// commands reach each target in the order they were numbered.
    pub async fn execute(&self, command: &str, target: &TargetId) -> Result<LegacyResponse, LegacyError> {
        let pending = {
            let mut encoder = self.encoder();
            let envelope = self.translate_with(&mut encoder, command, target)?;
            self.router.submit(envelope)?
        };
        let report = self.router.await_quorum(pending).await?;
        Ok(LegacyResponse {
            status: codes::OK,
            payload: report.first_payload().map(LegacyPayload::from_bytes),
        })
    }

    fn translate_with(
        &self,
        encoder: &mut SessionEncoder,
        command: &str,
        target: &TargetId,
    ) -> Result<RoutingEnvelope, LegacyError> {
        let command = LegacyCommand::parse(command)?;
        let tier = self
            .router
            .table()
            .snapshot()
            .get(target)
            .map(|t| t.tier)
            .ok_or_else(|| LegacyError::new(codes::NOT_FOUND, format!("unknown target {}", target)))?;

        let series = NumericSeries::control(
            &command.to_control_frame(),
            RoutingMetadata {
                tier,
                priority: PriorityClass::Normal,
            },
        );
        // legacy targets decode every command on its own
        encoder.reset_references();
        let message = encoder
            .encode(series, PolicyFlags::REQUIRES_ACK)
            .map_err(|e| LegacyError::new(codes::INTERNAL, e.to_string()))?;

        debug!(verb = %command.verb, %target, %tier, sequence = message.sequence(), "legacy command translated");
        Ok(self
            .router
            .envelope(RouteRequest::to_target(Arc::new(message), target.clone())))
    }

    fn encoder(&self) -> MutexGuard<'_, SessionEncoder> {
        self.encoder.lock().unwrap_or_else(|e| e.into_inner())
    }
}
