// Artifacts Module
// Naming grammar for every file the pipeline stages exchange

pub mod naming;

pub use naming::{ArtifactKind, ArtifactNamer};
