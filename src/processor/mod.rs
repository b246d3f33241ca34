pub mod alert_builder;
pub mod message_processor;
pub mod projector;

pub use alert_builder::AlertBuilder;
pub use message_processor::decode_event;
pub use projector::project;
