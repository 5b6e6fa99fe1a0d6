use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

/// Tracks real names that currently have an on-demand export running.
#[derive(Default, Clone)]
pub struct InFlightExports {
    names: Arc<DashMap<String, ()>>,
}

#[derive(Debug, Error)]
pub enum InFlightError {
    #[error("export already in progress for `{real_name}`")]
    AlreadyRunning { real_name: String },
}

impl InFlightExports {
    pub fn new() -> Self {
        Self {
            names: Arc::new(DashMap::new()),
        }
    }

    pub fn acquire(&self, real_name: &str) -> Result<ExportGuard, InFlightError> {
        use dashmap::mapref::entry::Entry;

        match self.names.entry(real_name.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(ExportGuard {
                    real_name: real_name.to_string(),
                    names: Arc::clone(&self.names),
                })
            }
            Entry::Occupied(_) => Err(InFlightError::AlreadyRunning {
                real_name: real_name.to_string(),
            }),
        }
    }

    pub fn is_running(&self, real_name: &str) -> bool {
        self.names.contains_key(real_name)
    }
}

pub struct ExportGuard {
    real_name: String,
    names: Arc<DashMap<String, ()>>,
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.names.remove(&self.real_name);
    }
}
