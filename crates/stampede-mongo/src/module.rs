//! Session Factory
//!
//! The module the host registers under [`MODULE_PATH`]. It hands out one
//! fresh, disconnected [`SessionClient`] per session and shares nothing but
//! the immutable dialer settings between them.

use std::sync::Arc;

use stampede_common::registry::{Exports, Module, ModuleInstance, ModuleRegistry};
use stampede_common::prelude::*;

use crate::driver::{Dialer, MongoDialer};
use crate::session::SessionClient;

/// Import path scripts use to load this module
pub const MODULE_PATH: &str = "stampede/x/mongo";

/// Produces one session client per session
#[derive(Debug)]
pub struct SessionFactory<D: Dialer = MongoDialer> {
    dialer: Arc<D>,
}

impl<D: Dialer> SessionFactory<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer: Arc::new(dialer),
        }
    }

    /// A new empty client bound to `session`
    pub fn new_session(&self, session: SessionInfo) -> SessionClient<D> {
        SessionClient::new(session, Arc::clone(&self.dialer))
    }
}

impl Default for SessionFactory<MongoDialer> {
    fn default() -> Self {
        Self::new(MongoDialer::default())
    }
}

impl<D: Dialer> Module for SessionFactory<D> {
    fn new_instance(&self, session: SessionInfo) -> Box<dyn ModuleInstance> {
        Box::new(SessionInstance {
            client: self.new_session(session),
        })
    }
}

/// Per-session instance; its default export is the session client
struct SessionInstance<D: Dialer> {
    client: SessionClient<D>,
}

impl<D: Dialer> ModuleInstance for SessionInstance<D> {
    fn exports(self: Box<Self>) -> Exports {
        Exports::new(self.client)
    }
}

/// Register the MongoDB module on `registry` using `dialer`
pub fn register<D: Dialer>(registry: &mut ModuleRegistry, dialer: D) -> Result<()> {
    registry.register(MODULE_PATH, Arc::new(SessionFactory::new(dialer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecContext;
    use crate::testing::MockDialer;
    use mongodb::bson::doc;

    const GOOD: &str = "mongodb://good:27017";

    #[test]
    fn test_new_session_is_disconnected() {
        let factory = SessionFactory::new(MockDialer::with_documents(GOOD, vec![]));
        let client = factory.new_session(SessionInfo::new(9));
        assert!(!client.is_connected());
        assert_eq!(client.session().id, 9);
    }

    #[test]
    fn test_registry_round_trip() {
        let mut registry = ModuleRegistry::new();
        register(&mut registry, MockDialer::with_documents(GOOD, vec![])).unwrap();
        assert!(registry.contains(MODULE_PATH));

        let client = registry
            .instantiate(MODULE_PATH, SessionInfo::new(4))
            .unwrap()
            .into_default::<SessionClient<MockDialer>>()
            .unwrap();
        assert_eq!(client.session().id, 4);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let mut registry = ModuleRegistry::new();
        register(
            &mut registry,
            MockDialer::with_documents(GOOD, vec![doc! { "n": 1 }]),
        )
        .unwrap();

        let mut first = registry
            .instantiate(MODULE_PATH, SessionInfo::new(1))
            .unwrap()
            .into_default::<SessionClient<MockDialer>>()
            .unwrap();
        let second = registry
            .instantiate(MODULE_PATH, SessionInfo::new(2))
            .unwrap()
            .into_default::<SessionClient<MockDialer>>()
            .unwrap();

        first.connect(GOOD, &ExecContext::background()).await.unwrap();
        assert!(first.is_connected());
        assert!(!second.is_connected());

        let err = second
            .aggregate("db", "coll", doc! { "$match": {} }, &ExecContext::background())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected(_)));
    }

    #[test]
    fn test_default_factory_uses_mongo_driver() {
        let factory: SessionFactory = SessionFactory::default();
        let client = factory.new_session(SessionInfo::new(1));
        assert!(!client.is_connected());
    }
}
