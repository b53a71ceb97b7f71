//! Lab configuration.

use std::path::PathBuf;

use crate::schema::SchemaSource;

/// Configuration for a [`SessionController`](crate::SessionController).
#[derive(Debug, Clone)]
pub struct LabConfig {
    /// Directory of the sled database holding the editor text (`None` = not persisted)
    pub store_path: Option<PathBuf>,

    /// Environment schema source (default: bundled)
    pub schema: SchemaSource,

    /// Upper bound on ticks executed by one `run` call (default: 10 000)
    pub max_run_steps: u64,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            schema: SchemaSource::Bundled,
            max_run_steps: 10_000,
        }
    }
}

impl LabConfig {
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn with_schema(mut self, schema: SchemaSource) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_max_run_steps(mut self, steps: u64) -> Self {
        self.max_run_steps = steps;
        self
    }
}
