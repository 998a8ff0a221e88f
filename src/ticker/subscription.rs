//! Subscription registry and the outbound command queue.
//!
//! The registry is the single source of truth for what the server should be
//! streaming: the server forgets everything on disconnect, so reconnects
//! replay the registry from scratch. Caller mutations produce [`Command`]s
//! which travel through the [`CommandQueue`] to the connection task; the
//! queue buffers while disconnected and preserves FIFO order.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::Result;
use crate::ticker::codec;
use crate::types::tick::Mode;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// An outbound control command awaiting serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Subscribe(Vec<u32>),
    Unsubscribe(Vec<u32>),
    SetMode(Mode, Vec<u32>),
}

impl Command {
    /// Serialize into the wire's JSON control envelope.
    pub(crate) fn encode(&self) -> Result<String> {
        match self {
            Self::Subscribe(tokens) => codec::encode_subscribe(tokens),
            Self::Unsubscribe(tokens) => codec::encode_unsubscribe(tokens),
            Self::SetMode(mode, tokens) => codec::encode_mode(*mode, tokens),
        }
    }

    fn tokens(&self) -> &[u32] {
        match self {
            Self::Subscribe(tokens) | Self::Unsubscribe(tokens) | Self::SetMode(_, tokens) => {
                tokens
            }
        }
    }

    /// Whether two commands are of the same kind, so that a newer one
    /// supersedes an older one for shared tokens.
    fn same_kind(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Subscribe(_), Self::Subscribe(_))
                | (Self::Unsubscribe(_), Self::Unsubscribe(_))
                | (Self::SetMode(..), Self::SetMode(..))
        )
    }
}

// ---------------------------------------------------------------------------
// Subscription registry
// ---------------------------------------------------------------------------

/// Authoritative map of subscribed tokens to their requested modes.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    modes: HashMap<u32, Mode>,
}

impl SubscriptionRegistry {
    /// Record a subscription for `tokens`, keeping the mode of tokens that
    /// are already subscribed. Returns the commands to emit: a subscribe for
    /// the newly added tokens, plus a mode command per non-default mode
    /// among them.
    pub(crate) fn subscribe(&mut self, tokens: &[u32]) -> Vec<Command> {
        let mut added = Vec::new();
        for &token in tokens {
            if !self.modes.contains_key(&token) {
                self.modes.insert(token, Mode::default());
                added.push(token);
            }
        }
        if added.is_empty() {
            return Vec::new();
        }

        let mut commands = vec![Command::Subscribe(added.clone())];
        let mut by_mode: BTreeMap<Mode, Vec<u32>> = BTreeMap::new();
        for &token in &added {
            by_mode.entry(self.modes[&token]).or_default().push(token);
        }
        for (mode, tokens) in by_mode {
            if mode != Mode::default() {
                commands.push(Command::SetMode(mode, tokens));
            }
        }
        commands
    }

    /// Drop `tokens` from the registry. Returns an unsubscribe command for
    /// the tokens that were actually subscribed.
    pub(crate) fn unsubscribe(&mut self, tokens: &[u32]) -> Vec<Command> {
        let removed: Vec<u32> = tokens
            .iter()
            .copied()
            .filter(|token| self.modes.remove(token).is_some())
            .collect();
        if removed.is_empty() {
            return Vec::new();
        }
        vec![Command::Unsubscribe(removed)]
    }

    /// Set `mode` for `tokens`, inserting unknown tokens along the way.
    /// Returns the mode command to emit.
    pub(crate) fn set_mode(&mut self, mode: Mode, tokens: &[u32]) -> Vec<Command> {
        for &token in tokens {
            self.modes.insert(token, mode);
        }
        vec![Command::SetMode(mode, tokens.to_vec())]
    }

    /// Tokens grouped by mode, sorted for deterministic replay.
    pub(crate) fn snapshot_for_replay(&self) -> BTreeMap<Mode, Vec<u32>> {
        let mut snapshot: BTreeMap<Mode, Vec<u32>> = BTreeMap::new();
        for (&token, &mode) in &self.modes {
            snapshot.entry(mode).or_default().push(token);
        }
        for tokens in snapshot.values_mut() {
            tokens.sort_unstable();
        }
        snapshot
    }

    /// Commands that re-establish the registry on a fresh connection: one
    /// subscribe for the union of tokens, then one mode command per distinct
    /// non-default mode.
    pub(crate) fn replay_commands(&self) -> Vec<Command> {
        let snapshot = self.snapshot_for_replay();
        let mut union: Vec<u32> = snapshot.values().flatten().copied().collect();
        if union.is_empty() {
            return Vec::new();
        }
        union.sort_unstable();

        let mut commands = vec![Command::Subscribe(union)];
        for (mode, tokens) in snapshot {
            if mode != Mode::default() {
                commands.push(Command::SetMode(mode, tokens));
            }
        }
        commands
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.modes.len()
    }
}

// ---------------------------------------------------------------------------
// Command queue
// ---------------------------------------------------------------------------

/// Bounded FIFO of outbound commands.
///
/// Pushed from caller threads and callbacks without blocking; drained by the
/// connection task while connected, so commands issued while disconnected
/// wait here for the next session. At capacity, tokens of the incoming
/// command are removed from older commands of the same kind instead of
/// dropping anything newer.
#[derive(Debug)]
pub(crate) struct CommandQueue {
    inner: Mutex<VecDeque<Command>>,
    notify: Notify,
    capacity: usize,
}

impl CommandQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Append a command, coalescing older same-token entries when full.
    pub(crate) fn push(&self, command: Command) {
        let mut queue = self.inner.lock().expect("command queue poisoned");
        if queue.len() >= self.capacity {
            for older in queue.iter_mut() {
                if older.same_kind(&command) {
                    match older {
                        Command::Subscribe(tokens)
                        | Command::Unsubscribe(tokens)
                        | Command::SetMode(_, tokens) => {
                            tokens.retain(|t| !command.tokens().contains(t));
                        }
                    }
                }
            }
            queue.retain(|c| !c.tokens().is_empty());
        }
        queue.push_back(command);
        drop(queue);
        self.notify.notify_one();
    }

    /// Wait for and pop the next command.
    pub(crate) async fn next(&self) -> Command {
        loop {
            let notified = self.notify.notified();
            if let Some(command) = self.inner.lock().expect("command queue poisoned").pop_front()
            {
                // Wake the next waiter in case more commands are queued.
                self.notify.notify_one();
                return command;
            }
            notified.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
