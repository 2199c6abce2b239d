//! Batch-wide port assignment. Runs once, single-threaded, before any worker starts.

use crate::domain::model::{
    AppOverride, Binding, BACKEND_PORT_PLACEHOLDER, FRONTEND_PORT_PLACEHOLDER,
};
use crate::utils::error::{PairgenError, Result};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortRequest {
    pub app_id: String,
    pub backend_port: Option<u16>,
    pub frontend_port: Option<u16>,
    pub bindings: BTreeMap<String, String>,
}

impl PortRequest {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }

    pub fn from_override(app_id: impl Into<String>, app: Option<&AppOverride>) -> Self {
        let mut request = Self::new(app_id);
        if let Some(app) = app {
            request.backend_port = app.backend_port;
            request.frontend_port = app.frontend_port;
            request.bindings = app.bindings.clone();
        }
        request
    }
}

pub struct PortAllocator {
    base_port: u16,
}

impl PortAllocator {
    pub fn new(base_port: u16) -> Self {
        Self { base_port }
    }

    /// One binding per request, in request order.
    ///
    /// Explicit ports are reserved first; a port asked for twice fails with
    /// `BindingConflict`. Everyone else gets the next free ports from the base,
    /// backend (`YYYY`) then frontend (`XXXX`).
    pub fn allocate(
        &self,
        requests: &[PortRequest],
        shared: &BTreeMap<String, String>,
    ) -> Result<Vec<(String, Binding)>> {
        let mut taken: HashMap<u16, String> = HashMap::new();

        for request in requests {
            for port in [request.backend_port, request.frontend_port].into_iter().flatten() {
                if let Some(owner) = taken.insert(port, request.app_id.clone()) {
                    return Err(PairgenError::BindingConflict {
                        port,
                        first_app: owner,
                        second_app: request.app_id.clone(),
                    });
                }
            }
        }

        let mut cursor = u32::from(self.base_port);
        let mut bindings = Vec::with_capacity(requests.len());

        for request in requests {
            let backend = match request.backend_port {
                Some(port) => port,
                None => next_free(&mut cursor, &mut taken, &request.app_id)?,
            };
            let frontend = match request.frontend_port {
                Some(port) => port,
                None => next_free(&mut cursor, &mut taken, &request.app_id)?,
            };

            let mut binding = Binding::new();
            for (name, value) in shared.iter().chain(request.bindings.iter()) {
                binding.insert(name.clone(), value.clone());
            }
            binding.insert(BACKEND_PORT_PLACEHOLDER, backend.to_string());
            binding.insert(FRONTEND_PORT_PLACEHOLDER, frontend.to_string());

            tracing::debug!("🔌 {}: backend {} frontend {}", request.app_id, backend, frontend);
            bindings.push((request.app_id.clone(), binding));
        }

        Ok(bindings)
    }
}

fn next_free(cursor: &mut u32, taken: &mut HashMap<u16, String>, app_id: &str) -> Result<u16> {
    loop {
        let port = u16::try_from(*cursor).map_err(|_| PairgenError::PortOutOfRange {
            app_id: app_id.to_string(),
            port: *cursor,
        })?;
        *cursor += 1;
        if !taken.contains_key(&port) {
            taken.insert(port, app_id.to_string());
            return Ok(port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_pairs_from_base() {
        let requests = vec![PortRequest::new("app_1"), PortRequest::new("app_2")];
        let bindings = PortAllocator::new(5000).allocate(&requests, &BTreeMap::new()).unwrap();

        assert_eq!(bindings[0].0, "app_1");
        assert_eq!(bindings[0].1.backend_port(), Some(5000));
        assert_eq!(bindings[0].1.frontend_port(), Some(5001));
        assert_eq!(bindings[1].1.backend_port(), Some(5002));
        assert_eq!(bindings[1].1.frontend_port(), Some(5003));
    }

    #[test]
    fn test_explicit_ports_are_skipped_by_sequence() {
        let mut pinned = PortRequest::new("app_2");
        pinned.backend_port = Some(5001);
        pinned.frontend_port = Some(5173);
        let requests = vec![PortRequest::new("app_1"), pinned, PortRequest::new("app_3")];

        let bindings = PortAllocator::new(5000).allocate(&requests, &BTreeMap::new()).unwrap();
        assert_eq!(bindings[0].1.backend_port(), Some(5000));
        assert_eq!(bindings[0].1.frontend_port(), Some(5002));
        assert_eq!(bindings[1].1.backend_port(), Some(5001));
        assert_eq!(bindings[1].1.frontend_port(), Some(5173));
        assert_eq!(bindings[2].1.backend_port(), Some(5003));
        assert_eq!(bindings[2].1.frontend_port(), Some(5004));
    }

    #[test]
    fn test_same_port_requested_twice_is_refused() {
        let mut a = PortRequest::new("app_1");
        a.backend_port = Some(5000);
        let mut b = PortRequest::new("app_2");
        b.frontend_port = Some(5000);

        let err = PortAllocator::new(6000)
            .allocate(&[a, b], &BTreeMap::new())
            .unwrap_err();
        match err {
            PairgenError::BindingConflict { port, first_app, second_app } => {
                assert_eq!(port, 5000);
                assert_eq!(first_app, "app_1");
                assert_eq!(second_app, "app_2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_port_range_exhausted() {
        let requests = vec![PortRequest::new("app_1"), PortRequest::new("app_2")];
        let err = PortAllocator::new(65533)
            .allocate(&requests, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, PairgenError::PortOutOfRange { port: 65536, .. }));
    }

    #[test]
    fn test_app_bindings_override_shared() {
        let mut shared = BTreeMap::new();
        shared.insert("APP_TITLE".to_string(), "Default".to_string());
        shared.insert("DB_NAME".to_string(), "app.db".to_string());

        let mut app = AppOverride::default();
        app.bindings.insert("APP_TITLE".to_string(), "Inventory".to_string());
        let requests = vec![PortRequest::from_override("app_1", Some(&app))];

        let bindings = PortAllocator::new(5000).allocate(&requests, &shared).unwrap();
        let binding = &bindings[0].1;
        assert_eq!(binding.get("APP_TITLE"), Some("Inventory"));
        assert_eq!(binding.get("DB_NAME"), Some("app.db"));
    }
}
