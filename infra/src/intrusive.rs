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

//! Conversions between an intrusive link field and the struct it is
//! embedded in. Containers in this crate never allocate standalone
//! nodes: an owner embeds one link per container membership, and an
//! adapter ties each link field to its owner so either side can be
//! recovered from the other. All of the crate's container-of pointer
//! arithmetic lives here.

use core::ptr::NonNull;

/// One (owner, link field) pairing. Implementations provide the field
/// offset; the pointer conversions are derived from it.
pub trait Adapter {
    fn offset() -> usize;

    /// Recovers the owning struct from its embedded link.
    ///
    /// # Safety
    ///
    /// `link` must point at the field this adapter describes, inside a
    /// live `T`.
    #[inline]
    unsafe fn owner_of<L, T>(link: NonNull<L>) -> NonNull<T> {
        NonNull::new_unchecked((link.as_ptr() as *mut u8).sub(Self::offset()) as *mut T)
    }

    /// Locates the embedded link inside a live owner.
    ///
    /// # Safety
    ///
    /// `owner` must point at a live `T` of the type this adapter
    /// describes.
    #[inline]
    unsafe fn link_of<T, L>(owner: NonNull<T>) -> NonNull<L> {
        NonNull::new_unchecked((owner.as_ptr() as *mut u8).add(Self::offset()) as *mut L)
    }
}
