// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::io;
use std::path::PathBuf;

use crate::reader;

/// Error conditions which may occur when loading a map into an [HdMap](crate::HdMap).
///
/// A failed load never affects the previously loaded map.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The dataset file could not be read.
    #[error("{}: {source}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The dataset could not be decoded, or it contains invalid data.
    #[error("malformed map dataset: {0}")]
    Malformed(#[from] reader::Error),
}
