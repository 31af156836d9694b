// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error type for data-model level failures.

use thiserror::Error;

use crate::derived_field::DerivedFieldError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    DerivedField(#[from] DerivedFieldError),
}
