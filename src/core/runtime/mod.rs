pub mod extract;
pub mod lock;
pub mod manager;
pub mod markers;
pub mod platform;

pub use extract::{ArchiveExtractor, Extractor, NativeUnzipExtractor, ZipExtractor};
pub use lock::InstallLock;
pub use manager::{InstallState, InstallationManager, InstallationRecord, ProgressCallback};
pub use markers::VersionStore;
pub use platform::{HostOs, PlatformFamily, PlatformProfile};
