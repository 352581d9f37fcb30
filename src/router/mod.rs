//! Client-side router with guarded transitions.
//!
//! NAVIGATION
//! ==========
//! Every navigation walks the same chain:
//!
//! `Requested → GlobalGuardEvaluated → [RouteGuardEvaluated] → Resolved`
//!
//! Global guards run first, in registration order, then the target route's
//! own guard. The first non-continue outcome wins. A redirect restarts the
//! chain at the new location, so the redirect target's guard runs too.
//! Resolution is synchronous and always terminates: redirect chains are
//! capped at [`MAX_REDIRECTS`].
//!
//! Locations use hash-history form; `/dashboard`, `#/dashboard` and
//! `/#/dashboard?tab=1` all resolve to the `/dashboard` route.

pub mod guard;
pub mod route;

use std::sync::Arc;

use crate::session::SessionContext;

pub use guard::{AuthGuard, Guard, GuardOutcome, LoggingGuard, MatchLogGuard, NavigationRequest};
pub use route::{DASHBOARD_PATH, LOGIN_PATH, Route, RouteTable, View, portal_routes};

/// Longest redirect chain followed before giving up.
pub const MAX_REDIRECTS: usize = 8;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("duplicate route name `{0}`")]
    DuplicateName(String),
    #[error("duplicate route path `{0}`")]
    DuplicatePath(String),
    #[error("invalid route path `{0}`")]
    InvalidPath(String),
    #[error("no route matches `{0}`")]
    NotFound(String),
    #[error("redirect loop while navigating to `{path}` ({hops} hops)")]
    RedirectLoop { path: String, hops: usize },
}

/// Position of a navigation in the guard chain. Logged at trace level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationPhase {
    Requested,
    GlobalGuardEvaluated,
    RouteGuardEvaluated,
    Resolved,
}

/// Route a navigation settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub path: String,
    pub view: View,
}

impl From<&Route> for Target {
    fn from(route: &Route) -> Self {
        Self { name: route.name.clone(), path: route.path.clone(), view: route.view }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Landed on the requested route.
    Continue(Target),
    /// A guard sent the navigation elsewhere.
    Redirect { requested: String, to: Target },
    /// A guard cancelled the navigation.
    Aborted { requested: String },
}

impl Resolution {
    /// Final route, if the navigation completed.
    #[must_use]
    pub fn target(&self) -> Option<&Target> {
        match self {
            Self::Continue(target) | Self::Redirect { to: target, .. } => Some(target),
            Self::Aborted { .. } => None,
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.target().map(|t| t.path.as_str())
    }
}

pub struct Router {
    table: RouteTable,
    global_guards: Vec<Arc<dyn Guard>>,
    session: SessionContext,
    history: Vec<String>,
}

impl Router {
    /// Router with the default global logging guard installed.
    #[must_use]
    pub fn new(table: RouteTable, session: SessionContext) -> Self {
        Self { table, global_guards: vec![Arc::new(LoggingGuard)], session, history: Vec::new() }
    }

    /// Router over [`portal_routes`].
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] if the route table is inconsistent.
    pub fn portal(session: SessionContext) -> Result<Self, RouterError> {
        Ok(Self::new(RouteTable::new(portal_routes())?, session))
    }

    /// Register an additional global guard, run after the existing ones.
    pub fn before_each(&mut self, guard: impl Guard + 'static) {
        self.global_guards.push(Arc::new(guard));
    }

    #[must_use]
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Route currently displayed.
    #[must_use]
    pub fn current(&self) -> Option<&Route> {
        self.history.last().and_then(|path| self.table.by_path(path))
    }

    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Run the guard chain for `location` without committing anything.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPath`] or [`RouterError::NotFound`] for
    /// a location that matches no route (including a redirect target), and
    /// [`RouterError::RedirectLoop`] when guards keep redirecting.
    pub fn resolve(&self, location: &str, from: Option<&Route>) -> Result<Resolution, RouterError> {
        let requested = normalize_location(location)?;
        let mut path = requested.clone();

        for hop in 0..=MAX_REDIRECTS {
            let to = self.table.by_path(&path).ok_or_else(|| RouterError::NotFound(path.clone()))?;
            tracing::trace!(phase = ?NavigationPhase::Requested, path = %path, hop, "navigation");

            match self.run_chain(&NavigationRequest { to, from }) {
                GuardOutcome::Continue => {
                    tracing::trace!(phase = ?NavigationPhase::Resolved, path = %path, "navigation");
                    let target = Target::from(to);
                    return Ok(if path == requested {
                        Resolution::Continue(target)
                    } else {
                        Resolution::Redirect { requested, to: target }
                    });
                }
                GuardOutcome::Redirect(next) => {
                    tracing::debug!(from = %path, to = %next, "navigation redirected");
                    path = normalize_location(&next)?;
                }
                GuardOutcome::Abort => {
                    tracing::debug!(path = %path, "navigation aborted");
                    return Ok(Resolution::Aborted { requested });
                }
            }
        }

        Err(RouterError::RedirectLoop { path: requested, hops: MAX_REDIRECTS })
    }

    /// Navigate from the current route and commit the result to history.
    ///
    /// # Errors
    ///
    /// See [`Router::resolve`]. History is untouched on error or abort.
    pub fn push(&mut self, location: &str) -> Result<Resolution, RouterError> {
        let resolution = self.resolve(location, self.current())?;
        if let Some(path) = resolution.path() {
            if self.history.last().map(String::as_str) != Some(path) {
                self.history.push(path.to_owned());
            }
        }
        Ok(resolution)
    }

    /// Re-navigate to the previous history entry through the full guard
    /// chain. Returns `None` when there is nothing to go back to.
    ///
    /// # Errors
    ///
    /// See [`Router::resolve`]. History is restored on error.
    pub fn back(&mut self) -> Result<Option<Resolution>, RouterError> {
        if self.history.len() < 2 {
            return Ok(None);
        }
        let Some(current) = self.history.pop() else {
            return Ok(None);
        };
        let Some(previous) = self.history.last().cloned() else {
            self.history.push(current);
            return Ok(None);
        };

        let from = self.table.by_path(&current);
        match self.resolve(&previous, from) {
            Ok(resolution) => {
                match resolution.path() {
                    Some(path) if path != previous => {
                        // The redirect replaces the guarded entry.
                        self.history.pop();
                        if self.history.last().map(String::as_str) != Some(path) {
                            self.history.push(path.to_owned());
                        }
                    }
                    Some(_) => {}
                    None => self.history.push(current),
                }
                Ok(Some(resolution))
            }
            Err(e) => {
                self.history.push(current);
                Err(e)
            }
        }
    }

    fn run_chain(&self, request: &NavigationRequest<'_>) -> GuardOutcome {
        for guard in &self.global_guards {
            let outcome = guard.check(request, &self.session);
            if outcome != GuardOutcome::Continue {
                tracing::debug!(guard = guard.label(), ?outcome, "global guard intervened");
                return outcome;
            }
        }
        tracing::trace!(phase = ?NavigationPhase::GlobalGuardEvaluated, route = %request.to.name, "navigation");

        let Some(guard) = request.to.guard() else {
            return GuardOutcome::Continue;
        };
        let outcome = guard.check(request, &self.session);
        tracing::trace!(
            phase = ?NavigationPhase::RouteGuardEvaluated,
            route = %request.to.name,
            guard = guard.label(),
            ?outcome,
            "navigation"
        );
        outcome
    }
}

/// Reduce a hash-history location to a route path.
///
/// # Errors
///
/// Returns [`RouterError::InvalidPath`] if no absolute path remains.
pub fn normalize_location(location: &str) -> Result<String, RouterError> {
    let trimmed = location.trim();
    let hashless = trimmed
        .strip_prefix("/#")
        .or_else(|| trimmed.strip_prefix('#'))
        .unwrap_or(trimmed);
    let path = hashless.split(['?', '#']).next().unwrap_or_default();

    if path.is_empty() {
        return Ok("/".to_owned());
    }
    if !path.starts_with('/') {
        return Err(RouterError::InvalidPath(location.to_owned()));
    }
    let path = path.trim_end_matches('/');
    Ok(if path.is_empty() { "/".to_owned() } else { path.to_owned() })
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
