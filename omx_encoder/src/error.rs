// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Errors that can happen while talking to an encoder backend.

use remain::sorted;
use thiserror::Error as ThisError;

/// An error reported by an encoder backend.
///
/// Only `BackendUnavailable` is fatal for the component; every other variant is logged and the
/// drain cycle carries on.
#[sorted]
#[derive(Debug, ThisError)]
pub enum VideoError {
    /// The backend failed while processing a request.
    #[error("backend failure: {0:#}")]
    BackendFailure(anyhow::Error),
    /// The backend could not be loaded or could not allocate an encoder context.
    #[error("encoder backend unavailable: {0:#}")]
    BackendUnavailable(anyhow::Error),
    /// The backend does not implement the requested operation.
    #[error("operation not supported by the backend: {0}")]
    Unsupported(&'static str),
}

pub type VideoResult<T> = Result<T, VideoError>;
