//! Errors for the handful of operations at a system boundary that can
//! genuinely fail. Everything author-facing goes through diagnostics
//! instead (see `diagnostics.rs`); this enum is only for failures the
//! compiler-core itself cannot route around.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("source file path could not be resolved: {path}")]
    UnresolvableSourceFile { path: String },

    #[error("catalog backend error: {0}")]
    CatalogBackend(String),
}
