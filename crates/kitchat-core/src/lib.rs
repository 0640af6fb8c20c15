pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod models;
pub mod route;
pub mod runtime;
pub mod stats;
pub mod store;
pub mod sync;
pub mod tracing_setup;

pub use config::CoreConfig;
pub use error::CoreError;
pub use events::CoreEvent;
pub use route::ConversationKey;
pub use runtime::{CoreHandle, CoreRuntime};
