// Copyright (c) 2025 vivo Mobile Communication Co., Ltd.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lock-free FIFO queues: a bounded sequence-counter ring, an
//! unbounded node-linked MPSC queue, and the intrusive MPSC core the
//! task scheduler builds its ready queue on.

pub mod bounded;
pub mod mpsc;
pub mod unbounded;

pub use bounded::BoundedQueue;
pub use mpsc::{MpscNode, MpscQueueCore, PopRef};
pub use unbounded::{Pop, UnboundedQueue};
