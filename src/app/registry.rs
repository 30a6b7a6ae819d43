//! Application registry: the set of mounted applications, looked up by
//! name during connect. Assembled once at startup from the enabled demo
//! applications and handed to every connection read-only.

use std::collections::HashMap;
use std::sync::Arc;

use crate::app::application::Application;

#[derive(Default)]
pub struct Registry {
    applications: HashMap<&'static str, Arc<Application>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { applications: HashMap::new() }
    }

    pub fn register(&mut self, app: Arc<Application>) {
        self.applications.insert(app.name(), app);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Application>> {
        self.applications.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::application::ApplicationHooks;
    use async_trait::async_trait;

    struct Stub;

    #[async_trait]
    impl ApplicationHooks for Stub {
        fn app_name(&self) -> &'static str {
            "stub"
        }
    }

    #[test]
    fn register_then_get_round_trips_by_name() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Application::new(Arc::new(Stub))));

        assert!(registry.get("stub").is_some());
        assert!(registry.get("missing").is_none());
    }
}
