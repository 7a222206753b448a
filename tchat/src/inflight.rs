//! One in-flight turn per thread, each with its own cancellation token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tcommon::ThreadId;
use tokio_util::sync::CancellationToken;

use crate::TurnState;

#[derive(Debug, Default)]
pub(crate) struct InFlightTurns {
    turns: Mutex<HashMap<ThreadId, InFlight>>,
    next_turn: AtomicU64,
}

#[derive(Debug)]
struct InFlight {
    turn: u64,
    cancel: CancellationToken,
    state: TurnState,
}

/// Identifies one registered turn. Only the registering turn can update or clear its entry.
#[derive(Debug, Clone)]
pub(crate) struct TurnTicket {
    pub(crate) thread_id: ThreadId,
    pub(crate) cancel: CancellationToken,
    turn: u64,
}

impl InFlightTurns {
    fn turns(&self) -> MutexGuard<'_, HashMap<ThreadId, InFlight>> {
        // The map stays consistent under poisoning: every critical section is a single insert,
        // remove or field write.
        self.turns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new turn for `thread_id`, cancelling whatever was running there.
    pub(crate) fn begin(&self, thread_id: &ThreadId) -> TurnTicket {
        let turn = self.next_turn.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let previous = self.turns().insert(
            thread_id.clone(),
            InFlight {
                turn,
                cancel: cancel.clone(),
                state: TurnState::Idle,
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        TurnTicket {
            thread_id: thread_id.clone(),
            cancel,
            turn,
        }
    }

    pub(crate) fn set_state(&self, ticket: &TurnTicket, state: TurnState) -> bool {
        match self.turns().get_mut(&ticket.thread_id) {
            Some(entry) if entry.turn == ticket.turn => {
                entry.state = state;
                true
            }
            _ => false,
        }
    }

    /// Clears the entry if it still belongs to `ticket`.
    pub(crate) fn finish(&self, ticket: &TurnTicket) -> bool {
        let mut turns = self.turns();
        let owned = turns
            .get(&ticket.thread_id)
            .is_some_and(|entry| entry.turn == ticket.turn);
        if owned {
            turns.remove(&ticket.thread_id);
        }
        owned
    }

    /// Cancels the thread's in-flight turn. Returns whether one was running.
    pub(crate) fn cancel(&self, thread_id: &ThreadId) -> bool {
        match self.turns().remove(thread_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn state(&self, thread_id: &ThreadId) -> TurnState {
        self.turns()
            .get(thread_id)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.turns().len()
    }
}
