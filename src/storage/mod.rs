// Storage layer: registry state, durable journal, atomic file writes
pub mod atomic;
pub mod journal;
pub mod registry;

pub use atomic::write_atomically;
pub use journal::RegistryStore;
pub use registry::{Checkpoint, ExtractionRegistry};
