//! Navigation guards.
//!
//! A guard sees the navigation request and the session and answers with one
//! of continue, redirect or abort. Guards are synchronous and never touch
//! the network.

use super::route::Route;
use crate::session::SessionContext;

/// Target and origin of a navigation, alive only while guards run.
#[derive(Debug, Clone, Copy)]
pub struct NavigationRequest<'a> {
    pub to: &'a Route,
    pub from: Option<&'a Route>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Continue,
    /// Restart navigation at another location.
    Redirect(String),
    /// Stay on the current route.
    Abort,
}

pub trait Guard: Send + Sync {
    fn check(&self, request: &NavigationRequest<'_>, session: &SessionContext) -> GuardOutcome;

    /// Short name used in logs.
    fn label(&self) -> &'static str {
        "guard"
    }
}

/// Global observer: logs every transition, never interferes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingGuard;

impl Guard for LoggingGuard {
    fn check(&self, request: &NavigationRequest<'_>, _session: &SessionContext) -> GuardOutcome {
        tracing::info!(
            to = %request.to.name,
            from = request.from.map_or("-", |r| r.name.as_str()),
            "route is changing"
        );
        GuardOutcome::Continue
    }

    fn label(&self) -> &'static str {
        "logging"
    }
}

/// Per-route observer that notes when its route is entered.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchLogGuard;

impl Guard for MatchLogGuard {
    fn check(&self, request: &NavigationRequest<'_>, _session: &SessionContext) -> GuardOutcome {
        tracing::info!(route = %request.to.name, "route matched");
        GuardOutcome::Continue
    }

    fn label(&self) -> &'static str {
        "match-log"
    }
}

/// Requires a stored session credential, otherwise redirects to login.
///
/// Presence only: the token is not checked against the server.
#[derive(Debug, Clone)]
pub struct AuthGuard {
    login_path: String,
}

impl AuthGuard {
    #[must_use]
    pub fn new(login_path: &str) -> Self {
        Self { login_path: login_path.to_owned() }
    }
}

impl Guard for AuthGuard {
    fn check(&self, request: &NavigationRequest<'_>, session: &SessionContext) -> GuardOutcome {
        if session.is_authenticated() {
            GuardOutcome::Continue
        } else {
            tracing::debug!(route = %request.to.name, redirect = %self.login_path, "no session credential");
            GuardOutcome::Redirect(self.login_path.clone())
        }
    }

    fn label(&self) -> &'static str {
        "auth"
    }
}
