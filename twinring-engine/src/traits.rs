// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A set of common traits used across the TwinRing engine.

use async_trait::async_trait;

use crate::types::SimResult;

/// A component that can be registered with the
/// [`Engine`](crate::engine::Engine) and whose `run()` is spawned when the
/// simulation starts.
#[async_trait(?Send)]
pub trait Runnable {
    async fn run(&self) -> SimResult;
}
