use std::{collections::BTreeMap, fmt, sync::Arc};

use tracing::debug;
use zpubsub_error::{ConfigError, ZResult};

use crate::{
    config::TransportParams,
    transport::{MemoryTransport, Transport},
};

/// Фабрика транспорта по параметрам подключения.
pub type TransportFactory = Arc<dyn Fn(&TransportParams) -> ZResult<Arc<dyn Transport>> + Send + Sync>;

/// Явный реестр бэкендов: имя -> фабрика транспорта.
///
/// Заполняется приложением при старте; [`BackendRegistry::with_defaults`]
/// регистрирует всё, что собрано в крейте.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, TransportFactory>,
}

impl BackendRegistry {
    /// Пустой реестр.
    pub fn new() -> Self {
        Self::default()
    }

    /// `memory` (один общий брокер на реестр) и `redis` при включённой
    /// feature `redis`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let memory = MemoryTransport::new();
        registry.register("memory", move |_params: &TransportParams| {
            Ok(Arc::new(memory.clone()) as Arc<dyn Transport>)
        });

        #[cfg(feature = "redis")]
        registry.register("redis", |params: &TransportParams| {
            let transport = crate::transport::RedisTransport::new(params.clone())?;
            Ok(Arc::new(transport) as Arc<dyn Transport>)
        });

        registry
    }

    /// Регистрирует фабрику; существующая запись с тем же именем заменяется.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(&TransportParams) -> ZResult<Arc<dyn Transport>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(backend = %name, "Backend registered");
        self.factories.insert(name, Arc::new(factory));
        self
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.factories.contains_key(name)
    }

    /// Имена зарегистрированных бэкендов в алфавитном порядке.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Создаёт транспорт бэкенда `name`.
    pub fn create(
        &self,
        name: &str,
        params: &TransportParams,
    ) -> ZResult<Arc<dyn Transport>> {
        match self.factories.get(name) {
            Some(factory) => factory(params),
            None => Err(ConfigError::UnknownBackend {
                name: name.to_string(),
                available: self.names(),
            }
            .into()),
        }
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
