//! Binding lifecycle state with atomic transitions and completion tracking.
//!
//! The interrupt path needs to know whether a binding may receive events and
//! must count down outstanding completions without taking a lock, so the
//! state and the outstanding-completion count share one `AtomicU32`.
//!
//! Layout: `[state(8 bits) | outstanding(24 bits)]`

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Binding lifecycle states.
///
/// ```text
///            acquire      prepare        start
///   Idle ──────────> Acquired ──> Configured ──> Running ──stop──> Stopping ──> Idle
///                                     ▲             │  ▲
///                                     │ prepare     │  │ internal restart
///                                   Idle            ▼  │
///                                (stopped)       Recovering ──failed──> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextState {
    /// Not streaming. A stopped binding returns here while keeping its resources.
    Idle = 0,
    /// Resources bound, nothing programmed yet.
    Acquired = 1,
    /// Initial configuration prepared.
    Configured = 2,
    /// Streaming and receiving events.
    Running = 3,
    /// Stop in progress.
    Stopping = 4,
    /// Internal stop/restart in progress after a fatal error.
    Recovering = 5,
}

impl ContextState {
    const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Acquired,
            2 => Self::Configured,
            3 => Self::Running,
            4 => Self::Stopping,
            _ => Self::Recovering,
        }
    }

    /// Whether events for a binding in this state are handed to its context.
    pub const fn accepts_events(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }
}

/// Combined state and outstanding-completion count in a single atomic value.
#[derive(Default)]
pub struct StateAndCount(AtomicU32);

impl StateAndCount {
    const STATE_SHIFT: u32 = 24;
    const COUNT_MASK: u32 = (1 << Self::STATE_SHIFT) - 1;

    /// Starts in `state` with nothing outstanding.
    pub fn new(state: ContextState) -> Self {
        Self(AtomicU32::new((state as u32) << Self::STATE_SHIFT))
    }

    #[inline]
    pub fn state(&self) -> ContextState {
        ContextState::from_raw(self.0.load(Ordering::Acquire) >> Self::STATE_SHIFT)
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Acquire) & Self::COUNT_MASK
    }

    /// Moves to `to` if the current state is one of `from`, keeping the count.
    ///
    /// Returns the previous state, or the actual state on mismatch.
    pub fn transition(&self, from: &[ContextState], to: ContextState) -> Result<ContextState, ContextState> {
        loop {
            let current = self.0.load(Ordering::Acquire);
            let state = ContextState::from_raw(current >> Self::STATE_SHIFT);
            if !from.contains(&state) {
                return Err(state);
            }
            let new_value = ((to as u32) << Self::STATE_SHIFT) | (current & Self::COUNT_MASK);
            match self.0.compare_exchange_weak(current, new_value, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(state),
                Err(_) => continue,
            }
        }
    }

    /// Sets the state unconditionally, keeping the count.
    pub fn force(&self, to: ContextState) -> ContextState {
        let prev = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(((to as u32) << Self::STATE_SHIFT) | (current & Self::COUNT_MASK))
            })
            .unwrap_or_else(|v| v);
        ContextState::from_raw(prev >> Self::STATE_SHIFT)
    }

    /// Replaces the outstanding count, keeping the state.
    pub fn set_count(&self, count: u32) {
        let count = count.min(Self::COUNT_MASK);
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            Some((current & !Self::COUNT_MASK) | count)
        });
    }

    /// Decrements the count if non-zero. Returns the remaining count.
    pub fn complete_one(&self) -> u32 {
        loop {
            let current = self.0.load(Ordering::Acquire);
            let count = current & Self::COUNT_MASK;
            if count == 0 {
                return 0;
            }
            match self
                .0
                .compare_exchange_weak(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return count - 1,
                Err(_) => continue,
            }
        }
    }
}

/// Lifecycle of one (context, hardware-line set) binding.
///
/// Besides the state this tracks how many completion groups are still owed
/// for the request in flight, and whether event delivery is paused.
pub struct BindingLifecycle {
    state_count: StateAndCount,
    paused: AtomicBool,
    /// Set when the outstanding count drops to zero so a waiter skips its
    /// next spin round.
    drained: AtomicBool,
}

impl BindingLifecycle {
    /// A freshly acquired binding.
    pub fn new() -> Self {
        Self {
            state_count: StateAndCount::new(ContextState::Acquired),
            paused: AtomicBool::new(false),
            drained: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn state(&self) -> ContextState {
        self.state_count.state()
    }

    /// Completion groups still expected for the request in flight.
    #[inline]
    pub fn outstanding(&self) -> u32 {
        self.state_count.count()
    }

    /// Moves to `to` if currently in one of `from`.
    pub fn transition(&self, from: &[ContextState], to: ContextState) -> Result<ContextState, ContextState> {
        let result = self.state_count.transition(from, to);
        if let Ok(prev) = result {
            trace!("binding state {:?} -> {:?}", prev, to);
        }
        result
    }

    /// Sets the state regardless of the current one. Used by release and by
    /// a failed recovery.
    pub fn force(&self, to: ContextState) -> ContextState {
        self.state_count.force(to)
    }

    /// Whether delivery is paused.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Sets the pause flag. Returns the previous value.
    pub fn set_paused(&self, paused: bool) -> bool {
        self.paused.swap(paused, Ordering::AcqRel)
    }

    /// Whether an event arriving now should reach the context.
    #[inline]
    pub fn accepts_events(&self) -> bool {
        self.state().accepts_events() && !self.is_paused()
    }

    /// Arms the number of completion groups expected for a new request.
    pub fn expect_completions(&self, groups: u32) {
        self.state_count.set_count(groups);
    }

    /// Counts down one delivered completion.
    pub fn complete_one(&self) {
        if self.state_count.complete_one() == 0 {
            self.drained.store(true, Ordering::Release);
        }
    }

    /// Forgets every outstanding completion.
    pub fn discard_outstanding(&self) {
        self.state_count.set_count(0);
        self.drained.store(true, Ordering::Release);
    }

    /// Waits for all outstanding completions, for at most `max_spins`.
    ///
    /// `poll` runs before every check, so a caller can hand queued
    /// completions over while it waits. Returns `false` on timeout.
    pub fn wait_completions(&self, max_spins: usize, mut poll: impl FnMut()) -> bool {
        self.wait_for(
            || {
                poll();
                self.state_count.count() == 0
            },
            max_spins,
        )
    }

    /// Spins until `condition` holds or `max_spins` elapse. A budget of zero
    /// checks the condition once. Blocking context only.
    pub(crate) fn wait_for(&self, mut condition: impl FnMut() -> bool, max_spins: usize) -> bool {
        let mut spins = 0;
        loop {
            if condition() {
                return true;
            }
            if spins >= max_spins {
                return false;
            }
            if self.drained.swap(false, Ordering::AcqRel) {
                continue;
            }
            for _ in 0..100 {
                core::hint::spin_loop();
            }
            spins += 100;
        }
    }
}

impl Default for BindingLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for BindingLifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BindingLifecycle")
            .field("state", &self.state())
            .field("outstanding", &self.outstanding())
            .field("paused", &self.is_paused())
            .finish()
    }
}
