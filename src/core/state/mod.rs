pub mod settings;

pub use settings::{default_anchor_dir, RuntimeSettings, DEFAULT_RUNTIME_VERSION};
