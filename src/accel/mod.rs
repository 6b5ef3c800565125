//! Optional native accelerator for batch classification

pub mod classifier;
pub mod loader;

pub use classifier::AcceleratedClassifier;
pub use loader::{AccelError, AccelLibrary};

use std::path::Path;

use crate::config::AcceleratorConfig;
use crate::culling::classify::{Classifier, SoftwareClassifier};

/// Pick the startup strategy: accelerated when the library binds, the
/// software reference otherwise. Never fails.
pub fn select_classifier(config: &AcceleratorConfig, base_dir: &Path) -> Box<dyn Classifier> {
    match AccelLibrary::try_load(config, base_dir) {
        Some(lib) => Box::new(AcceleratedClassifier::new(lib)),
        None => Box::new(SoftwareClassifier),
    }
}
