// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Declarative macros shared by the Pounce crates.
//!
//! # Macros Overview
//!
//! ## Types
//! - [`id_type!`] - Copyable index newtypes (labels, targets, rendezvous groups)
//! - [`menu_enum!`] - Enums backed by the string values of block menu fields
//!
//! ## Testing
//! - [`assert_matches!`] - Pattern assertions with a readable failure message
//! - [`assert_approx_eq!`] - Float comparison with a tolerance
//!
//! # Examples
//!
//! ```
//! use pounce_macros::*;
//!
//! id_type! {
//!     /// Index of a compiled continuation.
//!     pub LabelId(usize) => "L"
//! }
//!
//! let label = LabelId(3);
//! assert_eq!(label.to_string(), "L3");
//! assert_eq!(label.next(), LabelId(4));
//! ```

mod testing;
mod types;
