// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Driver
//!
//! A session is a loop over explicit states. Each state runs to completion
//! and may enqueue follow-up states; the driver takes the next pending
//! state in FIFO order and falls back to the idle state when the queue is
//! empty. A failed state is logged and the session continues; only an
//! explicit stop ends it.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::warn;

use crate::crypto::ChannelError;
use crate::net::NetworkError;
use crate::proto::ProtoError;
use crate::store::StoreError;

/// Session state error types.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("timed out waiting for a reply")]
    ReplyTimeout,

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// What the session does after a state completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// One side's set of session states.
pub trait SessionState: Sized {
    type Context;

    /// The state the driver falls back to when nothing is pending.
    fn idle() -> Self;

    /// Stable name for logging.
    fn name(&self) -> &'static str;

    /// Runs the state to completion, possibly enqueueing follow-ups.
    fn run(
        self,
        ctx: &mut Self::Context,
        pending: &mut VecDeque<Self>,
    ) -> Result<Step, SessionError>;
}

/// Drives one session until a state asks to stop.
pub fn drive<S: SessionState>(initial: S, ctx: &mut S::Context) {
    let mut pending: VecDeque<S> = VecDeque::new();
    let mut current = initial;

    loop {
        let name = current.name();
        match current.run(ctx, &mut pending) {
            Ok(Step::Stop) => break,
            Ok(Step::Continue) => {}
            Err(err) => warn!(state = name, error = %err, "session state failed"),
        }
        current = pending.pop_front().unwrap_or_else(S::idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Toy state machine recording execution order.
    enum Toy {
        Seed,
        Tag(u32),
        Idle,
    }

    impl SessionState for Toy {
        type Context = Vec<u32>;

        fn idle() -> Self {
            Toy::Idle
        }

        fn name(&self) -> &'static str {
            match self {
                Toy::Seed => "seed",
                Toy::Tag(_) => "tag",
                Toy::Idle => "idle",
            }
        }

        fn run(
            self,
            ctx: &mut Vec<u32>,
            pending: &mut VecDeque<Self>,
        ) -> Result<Step, SessionError> {
            match self {
                Toy::Seed => {
                    pending.push_back(Toy::Tag(1));
                    pending.push_back(Toy::Tag(2));
                    pending.push_back(Toy::Tag(3));
                    Ok(Step::Continue)
                }
                Toy::Tag(n) => {
                    ctx.push(n);
                    Ok(Step::Continue)
                }
                Toy::Idle => Ok(Step::Stop),
            }
        }
    }

    #[test]
    fn test_crypto_errors_convert_into_session_errors() {
        // Both handshakes propagate channel failures with `?`
        let err = SessionError::from(ChannelError::KeysNotGenerated);
        assert!(matches!(err, SessionError::Channel(_)));
        assert_eq!(err.to_string(), ChannelError::KeysNotGenerated.to_string());
    }

    #[test]
    fn test_pending_states_run_in_fifo_order() {
        let mut order = Vec::new();
        drive(Toy::Seed, &mut order);
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_failed_state_does_not_end_session() {
        enum Flaky {
            Fail,
            Mark,
            Idle,
        }
        impl SessionState for Flaky {
            type Context = Vec<u32>;
            fn idle() -> Self {
                Flaky::Idle
            }
            fn name(&self) -> &'static str {
                "flaky"
            }
            fn run(
                self,
                ctx: &mut Vec<u32>,
                pending: &mut VecDeque<Self>,
            ) -> Result<Step, SessionError> {
                match self {
                    Flaky::Fail => {
                        pending.push_back(Flaky::Mark);
                        Err(SessionError::ReplyTimeout)
                    }
                    Flaky::Mark => {
                        ctx.push(7);
                        Ok(Step::Continue)
                    }
                    Flaky::Idle => Ok(Step::Stop),
                }
            }
        }

        let mut marks = Vec::new();
        drive(Flaky::Fail, &mut marks);
        assert_eq!(marks, vec![7]);
    }
}
