/// Construction-time configuration: settings file and environment.
pub mod config;
/// Crate-level error types: pub/sub misuse, logging initialisation.
pub mod error;
/// Structured logging (filters, formats, console and file sinks).
pub mod logging;
/// Pub/Sub client: role guard, namespaces, serializer, listen loop.
pub mod pubsub;
/// Broker boundary and concrete transports (memory, redis).
pub mod transport;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Settings and connection parameters.
pub use config::{PubSubSettings, TransportParams};
/// Operation errors.
pub use error::{LoggingInitError, PubSubError};
/// Logging entry point.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Pub/Sub API.
pub use pubsub::{
    BackendRegistry, CallOptions, Handler, JsonSerializer, ListenOptions, MessageKind,
    MessageRecord, NamespaceMode, PubSub, PubSubBuilder, Role, RoleScope, Serializer,
};
/// Transports.
#[cfg(feature = "redis")]
pub use transport::RedisTransport;
pub use transport::{MemoryBroker, MemoryTransport, Transport};
/// Error system re-exports.
pub use zpubsub_error::{StackError, StatusCode, ZResult};
