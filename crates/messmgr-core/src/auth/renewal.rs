//! Single-flight slot for access-credential renewal.
//!
//! At most one renewal runs per session client. The slot is claimed under a
//! mutex before anything is awaited, so two callers can never both start one;
//! later callers join the running renewal through a [`Shared`] handle and all
//! observe the same outcome.

use std::sync::{Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::api::ApiError;

/// New access token on success. `None` when the session lives in a cookie and
/// the server did not hand back a bearer token.
pub type RenewalOutcome = Result<Option<String>, ApiError>;

pub type RenewalHandle = Shared<BoxFuture<'static, RenewalOutcome>>;

enum SlotState {
    Idle,
    Renewing { generation: u64, handle: RenewalHandle },
}

struct SlotInner {
    state: SlotState,
    next_generation: u64,
}

/// Result of [`RenewalSlot::claim_or_join`].
pub enum Claim {
    /// This caller occupied the slot and started the renewal.
    Started(RenewalHandle),
    /// A renewal was already running; this caller shares it.
    Joined(RenewalHandle),
}

impl Claim {
    pub fn handle(self) -> RenewalHandle {
        match self {
            Claim::Started(handle) | Claim::Joined(handle) => handle,
        }
    }

    pub fn started(&self) -> bool {
        matches!(self, Claim::Started(_))
    }
}

pub struct RenewalSlot {
    inner: Mutex<SlotInner>,
}

impl Default for RenewalSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl RenewalSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                state: SlotState::Idle,
                next_generation: 1,
            }),
        }
    }

    /// Join the in-flight renewal, or start one with `start`.
    ///
    /// `start` receives the generation it must pass to [`settle`](Self::settle)
    /// once it has finished. It runs while the slot lock is held and must not
    /// block; it should only build the future.
    pub fn claim_or_join<F>(&self, start: F) -> Claim
    where
        F: FnOnce(u64) -> BoxFuture<'static, RenewalOutcome>,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let SlotState::Renewing { ref handle, .. } = inner.state {
            return Claim::Joined(handle.clone());
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;
        let handle = start(generation).shared();
        inner.state = SlotState::Renewing {
            generation,
            handle: handle.clone(),
        };
        Claim::Started(handle)
    }

    /// Return the slot to idle if `generation` still occupies it.
    pub fn settle(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let occupied = matches!(
            inner.state,
            SlotState::Renewing { generation: current, .. } if current == generation
        );
        if occupied {
            inner.state = SlotState::Idle;
        }
        occupied
    }

    pub fn is_renewing(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(inner.state, SlotState::Renewing { .. })
    }
}
