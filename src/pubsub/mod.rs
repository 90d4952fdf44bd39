//! Клиент pub/sub поверх транспорта.
//!
//! Слои снизу вверх:
//! - [`RoleGuard`]: закрепление роли издателя или подписчика;
//! - [`NamespaceCodec`]: ключи `"{namespace}:{name}"` и их разбор;
//! - [`Serializer`]: кодек полезной нагрузки (по умолчанию JSON);
//! - [`BackendConnection`]: одно ленивое соединение на роль;
//! - [`PubSub`]: пространства имён, сериализация, таймауты и `listen`.

pub mod backend;
pub mod builder;
pub mod facade;
pub mod handler;
pub mod message;
pub mod namespace;
pub mod options;
pub mod registry;
pub mod role;
pub mod scope;
pub mod serializer;

pub use backend::BackendConnection;
pub use builder::PubSubBuilder;
pub use facade::PubSub;
pub use handler::Handler;
pub use message::{MessageKind, MessageRecord};
pub use namespace::{
    validate_namespace, KeyBuilder, NamespaceCodec, NamespaceMode, NAMESPACE_DELIMITER,
};
pub use options::{CallOptions, Decoder, ListenOptions};
pub use registry::{BackendRegistry, TransportFactory};
pub use role::{Role, RoleGuard};
pub use scope::RoleScope;
pub use serializer::{JsonSerializer, Serializer};
