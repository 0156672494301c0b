// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module customization hooks
//!
//! `registerHooks({ resolve, load })` installs interceptors that run before
//! the built-in resolver and loader. The most recently registered hook runs
//! first and may delegate to older ones through `next`.

pub mod chain;
pub mod load;
pub mod registry;
pub mod resolve;

pub use chain::{Chain, ChainStep, Terminal};
pub use load::{LoadContext, LoadResult, LoadStep, ModuleSource};
pub use registry::{HookHandle, HookRegistration, HookRegistry};
pub use resolve::{ResolveContext, ResolveResult, ResolveStep};
