use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use burrow_core::protocol::normalize_domain;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{Error, Result};
use crate::route::{ConnectionId, Route};

/// Maps each domain to the routes serving it and spreads requests across them
#[derive(Default)]
pub struct DomainRouter {
    routes: RwLock<HashMap<String, Vec<Arc<Route>>>>,
}

impl DomainRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `route` under its domain
    ///
    /// A connection serves a domain at most once.
    pub fn register_route(&self, route: Arc<Route>) -> Result<()> {
        let domain = normalize_domain(route.domain());
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let serving = routes.entry(domain.clone()).or_default();
        if serving
            .iter()
            .any(|existing| existing.connection() == route.connection())
        {
            return Err(Error::DuplicateRegistration { domain });
        }
        debug!(domain = %domain, connection = %route.connection(), "route registered");
        serving.push(route);
        Ok(())
    }

    /// Pick one route for `domain`, uniformly at random
    pub fn resolve(&self, domain: &str) -> Result<Arc<Route>> {
        let domain = normalize_domain(domain);
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .get(&domain)
            .and_then(|serving| serving.choose(&mut rand::thread_rng()))
            .cloned()
            .ok_or(Error::NotFound { domain })
    }

    /// Drop every route owned by `connection`, and any domain left without routes
    pub fn remove_routes_for(&self, connection: ConnectionId) -> Vec<Arc<Route>> {
        let mut removed = Vec::new();
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        routes.retain(|_, serving| {
            serving.retain(|route| {
                if route.connection() == connection {
                    removed.push(Arc::clone(route));
                    false
                } else {
                    true
                }
            });
            !serving.is_empty()
        });
        removed
    }

    /// Consistent copy of the whole table, sorted by domain
    pub fn snapshot(&self) -> Vec<(String, Vec<Arc<Route>>)> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut table: Vec<_> = routes
            .iter()
            .map(|(domain, serving)| (domain.clone(), serving.clone()))
            .collect();
        table.sort_by(|a, b| a.0.cmp(&b.0));
        table
    }

    pub fn route_count(&self, domain: &str) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_domain(domain))
            .map_or(0, Vec::len)
    }
}
