use super::{PreparationError, PreparationStep, StepOutcome};
use crate::provision::{NativeToolRecord, ProvisionOutcome, ensure};
use std::path::Path;

/// Runtime libraries the game expects next to its executable.
pub const RUNTIME_LIBRARY_NAMES: &[&str] = &["vcruntime140.dll", "vcruntime140_1.dll", "msvcp140.dll"];

/// Places the bundled C++ runtime libraries in the version directory.
pub struct RuntimeRedistributable {
    libraries: Vec<NativeToolRecord>,
}

impl RuntimeRedistributable {
    pub fn new(libraries: Vec<NativeToolRecord>) -> Self {
        Self { libraries }
    }
}

impl PreparationStep for RuntimeRedistributable {
    fn name(&self) -> &'static str {
        "runtime-redistributable"
    }

    fn apply(&self, version_dir: &Path) -> Result<StepOutcome, PreparationError> {
        let bundled: Vec<_> = self
            .libraries
            .iter()
            .filter(|library| library.is_embedded())
            .collect();
        if bundled.is_empty() {
            return Err(PreparationError::NothingEmbedded { step: self.name() });
        }

        let mut outcome = StepOutcome::AlreadyApplied;
        for library in bundled {
            if ensure(library, &version_dir.join(library.name()))? == ProvisionOutcome::Written {
                outcome = StepOutcome::Applied;
            }
        }
        Ok(outcome)
    }
}
