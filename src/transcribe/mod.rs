pub mod backend;
pub mod coordinator;
pub mod local;
pub mod remote;

pub use backend::TranscriptionBackend;
pub use coordinator::{TranscriptionCoordinator, UNAVAILABLE_TRANSCRIPT};
pub use local::LocalBackend;
pub use remote::RemoteBackend;
