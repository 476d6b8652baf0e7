// src/core/state/registry.rs

//! The session registry: registered users, active sessions and pending queues.
//!
//! All state lives behind one `parking_lot::Mutex`. Every public method takes the
//! lock exactly once, performs its checks before any mutation and never awaits,
//! so each call is an all-or-nothing step observed fully before or fully after
//! any other. Callers only ever receive owned copies of the state.

use super::session::{ConnectionId, OutboundMessage, Outbox, OutboxReceiver, Session, User};
use crate::core::MessengerError;
use crate::core::protocol::{Delivery, UserInfo};
use crate::core::validation::{is_valid_full_name, is_valid_message, is_valid_nickname};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc::error::SendError;
use tracing::debug;

/// Where a routed message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Pushed onto the outbox of the recipient's live connection.
    Delivered { connection: ConnectionId },
    /// Appended to the recipient's pending queue; `depth` is the queue length
    /// after the append.
    Queued { depth: usize },
}

/// Point-in-time counters, used for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub registered: usize,
    pub online: usize,
    pub queued: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Registered users in registration order.
    users: IndexMap<String, User>,
    /// nickname -> session. Always the inverse of `bindings`.
    sessions: HashMap<String, Session>,
    /// connection -> nickname. Always the inverse of `sessions`.
    bindings: HashMap<ConnectionId, String>,
    pending: HashMap<String, VecDeque<Delivery>>,
}

impl RegistryState {
    /// Removes the session bound to `connection`, if any, keeping both maps and
    /// the user's logged-in flag in agreement.
    fn unbind(&mut self, connection: ConnectionId) -> Option<String> {
        let nickname = self.bindings.remove(&connection)?;
        self.sessions.remove(&nickname);
        if let Some(user) = self.users.get_mut(&nickname) {
            user.logged_in = false;
        }
        Some(nickname)
    }

    /// Empties `outbox_rx`, returning what was buffered in it. Only sound while
    /// the lock is held: every push onto an outbox happens under the same lock,
    /// so nothing can be in flight.
    fn reclaim(outbox_rx: &mut OutboxReceiver) -> Vec<OutboundMessage> {
        let mut reclaimed = Vec::new();
        while let Ok(outbound) = outbox_rx.try_recv() {
            reclaimed.push(outbound);
        }
        reclaimed
    }

    /// Hands unwritten messages back to their recipients, oldest first. A
    /// recipient that is online gets them on its current outbox. Otherwise they
    /// go to the head of its queue, ahead of anything queued since. Messages for
    /// deleted users are dropped.
    fn requeue_front(&mut self, undelivered: Vec<OutboundMessage>) {
        let mut parked = Vec::new();
        for outbound in undelivered {
            match self.sessions.get(&outbound.recipient) {
                Some(session) => {
                    if let Err(SendError(outbound)) = session.outbox.send(outbound) {
                        parked.push(outbound);
                    }
                }
                None => parked.push(outbound),
            }
        }
        for outbound in parked.into_iter().rev() {
            if !self.users.contains_key(&outbound.recipient) {
                continue;
            }
            self.pending
                .entry(outbound.recipient)
                .or_default()
                .push_front(outbound.delivery);
        }
    }
}

/// The single shared store of users, sessions and pending messages.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a new, offline user.
    pub fn register(&self, nickname: &str, full_name: &str) -> Result<(), MessengerError> {
        if !is_valid_nickname(nickname) {
            return Err(MessengerError::BadFormat(format!(
                "invalid nickname '{nickname}'"
            )));
        }
        if !is_valid_full_name(full_name) {
            return Err(MessengerError::BadFormat("invalid full name".into()));
        }

        let mut state = self.state.lock();
        if state.users.contains_key(nickname) {
            return Err(MessengerError::NickTaken);
        }
        state.users.insert(nickname.to_string(), User::new(full_name));
        Ok(())
    }

    /// Binds `connection` to `nickname` and hands back everything queued for the
    /// user while it was offline, oldest first. The queue is left empty.
    pub fn login(
        &self,
        nickname: &str,
        connection: ConnectionId,
        outbox: Outbox,
    ) -> Result<Vec<Delivery>, MessengerError> {
        if !is_valid_nickname(nickname) {
            return Err(MessengerError::BadFormat(format!(
                "invalid nickname '{nickname}'"
            )));
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let user = state
            .users
            .get_mut(nickname)
            .ok_or(MessengerError::NoSuchUser)?;
        if state.sessions.contains_key(nickname) {
            return Err(MessengerError::AlreadyOnline);
        }
        if let Some(bound) = state.bindings.get(&connection) {
            return Err(MessengerError::InvalidState(format!(
                "connection is already logged in as '{bound}'"
            )));
        }

        user.logged_in = true;
        user.last_owner = Some(connection);
        state.sessions.insert(
            nickname.to_string(),
            Session {
                connection,
                outbox,
            },
        );
        state.bindings.insert(connection, nickname.to_string());

        let drained = state
            .pending
            .get_mut(nickname)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default();
        Ok(drained)
    }

    /// Ends the session bound to `connection`. The connection itself stays usable.
    pub fn logout(&self, connection: ConnectionId) -> Result<String, MessengerError> {
        self.state
            .lock()
            .unbind(connection)
            .ok_or_else(|| MessengerError::InvalidState("not logged in".into()))
    }

    /// Like `logout`, but also takes back every message still buffered in the
    /// connection's outbox and returns it to the head of its recipient's queue,
    /// all under one lock. A later login, on any connection, sees those messages
    /// in order ahead of anything routed after the logout.
    pub fn logout_reclaiming(
        &self,
        connection: ConnectionId,
        outbox_rx: &mut OutboxReceiver,
    ) -> Result<String, MessengerError> {
        let mut state = self.state.lock();
        let nickname = state
            .unbind(connection)
            .ok_or_else(|| MessengerError::InvalidState("not logged in".into()))?;
        let reclaimed = RegistryState::reclaim(outbox_rx);
        if !reclaimed.is_empty() {
            debug!(
                "{}: reclaimed {} unwritten message(s) for {} at logout.",
                connection,
                reclaimed.len(),
                nickname
            );
        }
        state.requeue_front(reclaimed);
        Ok(nickname)
    }

    /// Routes a message from the user bound to `from` to `to`.
    ///
    /// If the recipient is online the message is pushed onto its outbox while the
    /// lock is still held, so the recipient cannot log out between the decision
    /// and the hand-off. If the recipient is offline, or its outbox is already
    /// closed, the message is queued for its next login instead.
    pub fn route(
        &self,
        from: ConnectionId,
        to: &str,
        text: &str,
    ) -> Result<RouteOutcome, MessengerError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let sender = state
            .bindings
            .get(&from)
            .cloned()
            .ok_or_else(|| MessengerError::Unauthorized("login required".into()))?;
        if !is_valid_nickname(to) {
            return Err(MessengerError::BadFormat(format!(
                "invalid recipient '{to}'"
            )));
        }
        if !is_valid_message(text) {
            return Err(MessengerError::BadFormat(
                "message is empty or too long".into(),
            ));
        }
        if !state.users.contains_key(to) {
            return Err(MessengerError::NoSuchUser);
        }

        let delivery = Delivery {
            from: sender,
            text: text.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        if let Some(session) = state.sessions.get(to) {
            let outbound = OutboundMessage {
                recipient: to.to_string(),
                delivery: delivery.clone(),
            };
            if session.outbox.send(outbound).is_ok() {
                return Ok(RouteOutcome::Delivered {
                    connection: session.connection,
                });
            }
            debug!(
                "Outbox of {} ({}) is closed; queueing message instead.",
                to, session.connection
            );
        }

        let queue = state.pending.entry(to.to_string()).or_default();
        queue.push_back(delivery);
        Ok(RouteOutcome::Queued { depth: queue.len() })
    }

    /// A snapshot of every registered user, in registration order.
    pub fn list_users(&self) -> Vec<UserInfo> {
        self.state
            .lock()
            .users
            .iter()
            .map(|(nickname, user)| UserInfo {
                nickname: nickname.clone(),
                full_name: user.full_name.clone(),
                online: user.logged_in,
            })
            .collect()
    }

    /// Deletes an offline account on behalf of the connection that last owned it.
    /// Returns the number of queued messages discarded with it.
    pub fn delete_user(
        &self,
        nickname: &str,
        requester: ConnectionId,
    ) -> Result<usize, MessengerError> {
        if !is_valid_nickname(nickname) {
            return Err(MessengerError::BadFormat(format!(
                "invalid nickname '{nickname}'"
            )));
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let user = state
            .users
            .get(nickname)
            .ok_or(MessengerError::NoSuchUser)?;

        let bound_elsewhere = state
            .bindings
            .get(&requester)
            .is_some_and(|bound| bound != nickname);
        if user.last_owner != Some(requester) || bound_elsewhere {
            return Err(MessengerError::Unauthorized(
                "accounts can only be deleted by their owner".into(),
            ));
        }
        if user.logged_in {
            return Err(MessengerError::InvalidState(
                "log out before deleting the account".into(),
            ));
        }

        state.users.shift_remove(nickname);
        let discarded = state
            .pending
            .remove(nickname)
            .map(|queue| queue.len())
            .unwrap_or(0);
        Ok(discarded)
    }

    /// Releases whatever `connection` held. Safe to call more than once; only the
    /// first call after a login returns the nickname.
    pub fn cleanup(&self, connection: ConnectionId) -> Option<String> {
        self.state.lock().unbind(connection)
    }

    /// Releases a closing connection: ends its session, closes its outbox and
    /// hands `unsent` followed by everything still buffered in the outbox back
    /// to the recipients, all under one lock. Returns the nickname that was
    /// bound, like `cleanup`.
    pub fn release(
        &self,
        connection: ConnectionId,
        outbox_rx: &mut OutboxReceiver,
        mut unsent: Vec<OutboundMessage>,
    ) -> Option<String> {
        let mut state = self.state.lock();
        outbox_rx.close();
        let nickname = state.unbind(connection);
        unsent.extend(RegistryState::reclaim(outbox_rx));
        if !unsent.is_empty() {
            debug!(
                "{}: requeueing {} undelivered message(s).",
                connection,
                unsent.len()
            );
        }
        state.requeue_front(unsent);
        nickname
    }

    /// Hands messages that were given to a connection but never written back to
    /// their recipients, oldest first. An online recipient gets them on its
    /// current outbox; an offline one finds them at the head of its queue, ahead
    /// of anything queued since. Messages for deleted users are dropped.
    pub fn requeue_front(&self, undelivered: Vec<OutboundMessage>) {
        if undelivered.is_empty() {
            return;
        }
        self.state.lock().requeue_front(undelivered);
    }

    pub fn is_online(&self, nickname: &str) -> bool {
        self.state.lock().sessions.contains_key(nickname)
    }

    /// The nickname currently bound to `connection`, if any.
    pub fn nickname_of(&self, connection: ConnectionId) -> Option<String> {
        self.state.lock().bindings.get(&connection).cloned()
    }

    pub fn pending_for(&self, nickname: &str) -> usize {
        self.state
            .lock()
            .pending
            .get(nickname)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            registered: state.users.len(),
            online: state.sessions.len(),
            queued: state.pending.values().map(VecDeque::len).sum(),
        }
    }

    /// Verifies the cross-map invariants: `sessions` and `bindings` are exact
    /// inverses, a user is flagged logged in iff it has a session, and every
    /// session and queue belongs to a registered user.
    pub fn check_consistency(&self) -> Result<(), String> {
        let state = self.state.lock();
        if state.sessions.len() != state.bindings.len() {
            return Err(format!(
                "{} sessions but {} bindings",
                state.sessions.len(),
                state.bindings.len()
            ));
        }
        for (nickname, session) in &state.sessions {
            if state.bindings.get(&session.connection) != Some(nickname) {
                return Err(format!(
                    "session for '{nickname}' is not bound back from {}",
                    session.connection
                ));
            }
            if !state.users.contains_key(nickname) {
                return Err(format!("session for unregistered user '{nickname}'"));
            }
        }
        for (nickname, user) in &state.users {
            if user.logged_in != state.sessions.contains_key(nickname) {
                return Err(format!(
                    "user '{nickname}' logged_in={} disagrees with sessions",
                    user.logged_in
                ));
            }
        }
        if let Some(orphan) = state.pending.keys().find(|n| !state.users.contains_key(*n)) {
            return Err(format!("pending queue for unregistered user '{orphan}'"));
        }
        Ok(())
    }
}
