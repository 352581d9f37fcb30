//! Route table: named paths mapped to views, each with an optional guard.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::RouterError;
use super::guard::{AuthGuard, Guard, MatchLogGuard};

pub const LOGIN_PATH: &str = "/login";
pub const DASHBOARD_PATH: &str = "/dashboard";

/// View rendered for a route. Opaque to the router.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum View {
    Login,
    Register,
    Welcome,
    FileManagement,
    ModelManagement,
    Diagnosis,
    ReportGenerative,
    Dashboard,
}

#[derive(Clone)]
pub struct Route {
    pub path: String,
    pub name: String,
    pub view: View,
    guard: Option<Arc<dyn Guard>>,
}

impl Route {
    #[must_use]
    pub fn new(path: &str, name: &str, view: View) -> Self {
        Self { path: path.to_owned(), name: name.to_owned(), view, guard: None }
    }

    /// Attach the route's own guard, evaluated after the global guards.
    #[must_use]
    pub fn with_guard(mut self, guard: impl Guard + 'static) -> Self {
        self.guard = Some(Arc::new(guard));
        self
    }

    #[must_use]
    pub fn guard(&self) -> Option<&dyn Guard> {
        self.guard.as_deref()
    }

    #[must_use]
    pub fn is_guarded(&self) -> bool {
        self.guard.is_some()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("view", &self.view)
            .field("guard", &self.guard.as_ref().map(|g| g.label()))
            .finish()
    }
}

/// Ordered, immutable set of routes with unique names and paths.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    by_path: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl RouteTable {
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPath`] for a path not starting with `/`,
    /// and [`RouterError::DuplicatePath`] / [`RouterError::DuplicateName`]
    /// when two routes collide.
    pub fn new(routes: Vec<Route>) -> Result<Self, RouterError> {
        let mut by_path = HashMap::with_capacity(routes.len());
        let mut by_name = HashMap::with_capacity(routes.len());

        for (idx, route) in routes.iter().enumerate() {
            if !route.path.starts_with('/') {
                return Err(RouterError::InvalidPath(route.path.clone()));
            }
            if by_path.insert(route.path.clone(), idx).is_some() {
                return Err(RouterError::DuplicatePath(route.path.clone()));
            }
            if by_name.insert(route.name.clone(), idx).is_some() {
                return Err(RouterError::DuplicateName(route.name.clone()));
            }
        }

        Ok(Self { routes, by_path, by_name })
    }

    #[must_use]
    pub fn by_path(&self, path: &str) -> Option<&Route> {
        self.by_path.get(path).map(|&idx| &self.routes[idx])
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Route> {
        self.by_name.get(name).map(|&idx| &self.routes[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The portal's route surface. Only the dashboard is access-controlled.
#[must_use]
pub fn portal_routes() -> Vec<Route> {
    vec![
        Route::new(LOGIN_PATH, "LoginPage", View::Login).with_guard(MatchLogGuard),
        Route::new("/register", "RegisterPage", View::Register),
        Route::new("/welcome", "WelcomePage", View::Welcome),
        Route::new("/file-management", "FileManagement", View::FileManagement),
        Route::new("/model-management", "ModelManagement", View::ModelManagement),
        Route::new("/diagnosis", "DiagnosisPage", View::Diagnosis),
        Route::new("/report-generative", "ReportGenerative", View::ReportGenerative),
        Route::new(DASHBOARD_PATH, "DashboardPage", View::Dashboard).with_guard(AuthGuard::new(LOGIN_PATH)),
    ]
}
