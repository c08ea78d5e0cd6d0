//! Session filtering
//!
//! A session passes when every criterion of the [`FilterConfig`] holds. Each
//! list criterion is "allow list empty or value allowed, and value not denied".

use crate::model::{PlayerState, Session, SessionKind};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;

/// Allow list and deny list over one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowDeny<T> {
    #[serde(default = "Vec::new")]
    pub allow: Vec<T>,
    #[serde(default = "Vec::new")]
    pub deny: Vec<T>,
}

impl<T> Default for AllowDeny<T> {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}

impl<T> AllowDeny<T> {
    pub fn allow(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            allow: values.into_iter().collect(),
            deny: Vec::new(),
        }
    }

    pub fn deny(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            allow: Vec::new(),
            deny: values.into_iter().collect(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }

    /// An absent value never matches the allow list and never hits the
    /// deny list.
    pub fn permits<Q>(&self, value: Option<&Q>) -> bool
    where
        T: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        let allowed = self.allow.is_empty()
            || value.is_some_and(|v| self.allow.iter().any(|a| Borrow::<Q>::borrow(a) == v));
        let denied = value.is_some_and(|v| self.deny.iter().any(|d| Borrow::<Q>::borrow(d) == v));
        allowed && !denied
    }
}

/// Network locality criterion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkFilter {
    Local,
    Remote,
    #[default]
    Both,
}

/// Play state criterion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayStateFilter {
    Playing,
    Paused,
    #[default]
    Both,
}

/// Declarative filter applied to every parsed session list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Matched against the raw user title, before aliasing
    pub users: AllowDeny<String>,
    pub kinds: AllowDeny<SessionKind>,
    /// Matched against [`Session::library_title`]
    pub libraries: AllowDeny<String>,
    pub network: NetworkFilter,
    pub play_state: PlayStateFilter,
    /// Raw user title → displayed title; applied while parsing
    pub user_aliases: HashMap<String, String>,
}

impl FilterConfig {
    /// Whether `session` satisfies every criterion
    pub fn accepts(&self, session: &Session) -> bool {
        self.accepts_user(session)
            && self.kinds.permits(Some(&session.kind()))
            && self.libraries.permits(session.library_title())
            && self.accepts_network(session)
            && self.accepts_play_state(session)
    }

    /// Order-preserving subset of `sessions` accepted by this filter
    pub fn apply(&self, sessions: &[Session]) -> Vec<Session> {
        sessions
            .iter()
            .filter(|session| self.accepts(session))
            .cloned()
            .collect()
    }

    fn accepts_user(&self, session: &Session) -> bool {
        match &session.user {
            None => true,
            Some(user) => self.users.permits(user.title.as_deref()),
        }
    }

    // Sessions without a player record are excluded whenever a locality is
    // requested.
    fn accepts_network(&self, session: &Session) -> bool {
        match self.network {
            NetworkFilter::Both => true,
            NetworkFilter::Local => session.is_local() == Some(true),
            NetworkFilter::Remote => session.is_local() == Some(false),
        }
    }

    fn accepts_play_state(&self, session: &Session) -> bool {
        match self.play_state {
            PlayStateFilter::Both => true,
            PlayStateFilter::Playing => session.player_state() == Some(&PlayerState::Playing),
            PlayStateFilter::Paused => session.player_state() == Some(&PlayerState::Paused),
        }
    }
}

/// Free-function form of [`FilterConfig::apply`]
pub fn filter_sessions(sessions: &[Session], cfg: &FilterConfig) -> Vec<Session> {
    cfg.apply(sessions)
}
