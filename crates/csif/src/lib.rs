pub mod backend;
pub mod capability;
pub mod config;
pub mod error;
pub mod id;
pub mod registry;
pub mod server;
pub mod transport;
pub mod volume;

mod keyed;

pub use config::{BackendKind, Config};
pub use registry::VolumeRegistry;
pub use server::ControllerServer;
pub use volume::{AccessType, VolumeInfo};
