// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Atomic primitives, swapped for their `loom` counterparts when model checking

#[cfg(all(loom, test))]
mod loom_primitive {
    pub use ::loom::sync::{atomic::*, Arc};
}

#[cfg(all(loom, test))]
pub use self::loom_primitive::*;

mod core_primitive {
    pub use ::core::sync::atomic::*;
    pub use ::std::sync::Arc;
}

#[cfg(not(all(loom, test)))]
pub use self::core_primitive::*;
