//! Processing Layer
//!
//! Validation, type-directed processing, storage handoff and fan-out.

pub mod dispatcher;
pub mod pipeline;
pub mod processor;
pub mod storage;
pub mod validator;

pub use dispatcher::{
    handler_fn, DispatcherConfig, EventDispatcher, EventHandler, OverflowPolicy, Subscriber,
};
pub use pipeline::ProcessingPipeline;
pub use processor::{DataProcessor, EventProcessor};
pub use storage::{DataStorage, EventQuery, InMemoryStorage, MatchQuery};
pub use validator::{CompositeValidator, DataValidator, EventValidator, ValidationRule};
