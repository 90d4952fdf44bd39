pub mod logging;
pub mod pubsub;

pub use logging::LoggingInitError;
pub use pubsub::PubSubError;
