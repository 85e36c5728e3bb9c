// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Time management: multi-frequency [clocks](clock::Clock) and the overall
//! [simulation time](simtime::SimTime).

pub mod clock;
pub mod simtime;
