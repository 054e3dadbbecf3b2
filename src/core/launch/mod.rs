pub mod env;
pub mod task;

pub use env::{launch_environment, sanitized_environment, EMBEDDER_ENV_KEYS};
pub use task::spawn_detached;
