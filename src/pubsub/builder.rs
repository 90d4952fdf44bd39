use std::{fmt, sync::Arc, time::Duration};

use zpubsub_error::{ConfigError, ZResult};

use super::{
    BackendConnection, BackendRegistry, JsonSerializer, KeyBuilder, NamespaceCodec,
    NamespaceMode, PubSub, Role, Serializer,
};
use crate::{
    config::{PubSubSettings, DEFAULT_LISTEN_POLL_MS, DEFAULT_TIMEOUT_SECS},
    transport::{MemoryTransport, Transport},
};

/// Построитель [`PubSub`].
///
/// Без явного транспорта используется отдельный [`MemoryTransport`].
pub struct PubSubBuilder<S: Serializer = JsonSerializer> {
    transport: Option<Arc<dyn Transport>>,
    namespace: Option<String>,
    key_builder: Option<KeyBuilder>,
    timeout: Option<Duration>,
    serializer: S,
    role: Option<Role>,
    namespace_mode: NamespaceMode,
    listen_poll_interval: Duration,
}

impl PubSubBuilder<JsonSerializer> {
    pub fn new() -> Self {
        Self {
            transport: None,
            namespace: None,
            key_builder: None,
            timeout: Some(Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS)),
            serializer: JsonSerializer,
            role: None,
            namespace_mode: NamespaceMode::default(),
            listen_poll_interval: Duration::from_millis(DEFAULT_LISTEN_POLL_MS),
        }
    }

    /// Заполняет построитель из настроек, транспорт берётся из реестра.
    pub fn from_settings(
        settings: &PubSubSettings,
        registry: &BackendRegistry,
    ) -> ZResult<Self> {
        settings.validate()?;
        let transport = registry.create(&settings.backend, &settings.transport)?;
        let mut builder = Self::new()
            .transport(transport)
            .timeout(settings.timeout())
            .namespace_mode(settings.namespace_mode())
            .listen_poll_interval(settings.listen_poll_interval());
        builder.namespace = settings.namespace.clone();
        Ok(builder)
    }
}

impl<S: Serializer> PubSubBuilder<S> {
    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn namespace(
        mut self,
        namespace: impl Into<String>,
    ) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn key_builder<F>(
        mut self,
        key_builder: F,
    ) -> Self
    where
        F: Fn(&str, Option<&str>) -> String + Send + Sync + 'static,
    {
        self.key_builder = Some(Arc::new(key_builder));
        self
    }

    /// Таймаут операций; `None` или ноль — без ограничения.
    pub fn timeout(
        mut self,
        timeout: Option<Duration>,
    ) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn serializer<S2: Serializer>(
        self,
        serializer: S2,
    ) -> PubSubBuilder<S2> {
        PubSubBuilder {
            transport: self.transport,
            namespace: self.namespace,
            key_builder: self.key_builder,
            timeout: self.timeout,
            serializer,
            role: self.role,
            namespace_mode: self.namespace_mode,
            listen_poll_interval: self.listen_poll_interval,
        }
    }

    /// Закрепляет роль заранее, до первой операции.
    pub fn role(
        mut self,
        role: Role,
    ) -> Self {
        self.role = Some(role);
        self
    }

    pub fn namespace_mode(
        mut self,
        mode: NamespaceMode,
    ) -> Self {
        self.namespace_mode = mode;
        self
    }

    /// Шаг опроса транспорта в `listen`; должен быть ненулевым.
    pub fn listen_poll_interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.listen_poll_interval = interval;
        self
    }

    pub fn build(self) -> ZResult<PubSub<S>> {
        if self.listen_poll_interval.is_zero() {
            return Err(ConfigError::InvalidParameter {
                name: "listen_poll_interval".to_string(),
                reason: "must be non-zero".to_string(),
            }
            .into());
        }
        let mut codec = NamespaceCodec::new(self.namespace)?.with_mode(self.namespace_mode);
        if let Some(key_builder) = self.key_builder {
            codec = codec.with_key_builder(key_builder);
        }

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(MemoryTransport::new()));
        let backend = BackendConnection::new(transport, self.role, self.listen_poll_interval);
        Ok(PubSub::from_parts(
            backend,
            codec,
            self.timeout,
            self.serializer,
        ))
    }
}

impl Default for PubSubBuilder<JsonSerializer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Serializer> fmt::Debug for PubSubBuilder<S> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PubSubBuilder")
            .field("transport", &self.transport.as_ref().map(|t| t.describe()))
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .field("role", &self.role)
            .field("namespace_mode", &self.namespace_mode)
            .finish()
    }
}
