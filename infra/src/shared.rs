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

//! A small atomically refcounted pointer whose layout is known to this
//! crate, so that intrusive containers can recover the refcount block
//! from an embedded link field. There is no weak counter.

use crate::{
    intrusive::Adapter,
    list::{ListHead, ListIterator},
};
use core::{
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::NonNull,
    sync::atomic::{fence, Ordering},
};

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "32")] {
        type AtomicCount = core::sync::atomic::AtomicU32;
    } else {
        type AtomicCount = core::sync::atomic::AtomicUsize;
    }
}

struct SharedInner<T> {
    count: AtomicCount,
    data: T,
}

/// An owning handle to a refcounted `T`.
// Transparent so that Option<Shared<T>> costs one pointer.
#[repr(transparent)]
pub struct Shared<T> {
    inner: NonNull<SharedInner<T>>,
}

impl<T> Shared<T> {
    pub fn new(data: T) -> Self {
        let inner = Box::new(SharedInner {
            count: AtomicCount::new(1),
            data,
        });
        Self {
            inner: unsafe { NonNull::new_unchecked(Box::into_raw(inner)) },
        }
    }

    pub fn strong_count(this: &Self) -> usize {
        unsafe { this.inner.as_ref() }.count.load(Ordering::Relaxed) as usize
    }

    #[inline]
    pub fn data_ptr(this: &Self) -> *const T {
        unsafe { &this.inner.as_ref().data as *const T }
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.inner == b.inner
    }

    /// Dissolves the handle into its payload pointer without touching
    /// the refcount. The count the handle held is transferred to the
    /// caller, who must eventually pass the pointer back through
    /// [`Shared::from_data_ptr`].
    pub fn into_data_ptr(this: Self) -> *const T {
        let ptr = Self::data_ptr(&this);
        mem::forget(this);
        ptr
    }

    /// Rebuilds a handle from a payload pointer, adopting the count
    /// that [`Shared::into_data_ptr`] left behind.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_data_ptr` (or equivalent bookkeeping)
    /// and each transferred count must be adopted exactly once.
    pub unsafe fn from_data_ptr(ptr: *const T) -> Self {
        Self {
            inner: NonNull::new_unchecked(Self::inner_of(ptr)),
        }
    }

    /// Like [`Shared::from_data_ptr`] but takes a fresh count instead
    /// of adopting one, leaving the original owner's count intact.
    ///
    /// # Safety
    ///
    /// `ptr` must point at the payload of a live `Shared` allocation.
    pub unsafe fn clone_from_data_ptr(ptr: *const T) -> Self {
        let inner = Self::inner_of(ptr);
        let old = (*inner).count.fetch_add(1, Ordering::Relaxed);
        debug_assert!(old >= 1);
        Self {
            inner: NonNull::new_unchecked(inner),
        }
    }

    /// Drops one count on behalf of a container that held it through a
    /// raw link rather than a handle.
    ///
    /// # Safety
    ///
    /// Some other handle must still be alive; this must never release
    /// the final count.
    pub unsafe fn decrement_strong_count(this: &Self) {
        let old = this.inner.as_ref().count.fetch_sub(1, Ordering::Relaxed);
        assert!(old > 1);
    }

    #[inline]
    unsafe fn inner_of(ptr: *const T) -> *mut SharedInner<T> {
        let offset = mem::offset_of!(SharedInner<T>, data);
        (ptr as *const u8).sub(offset) as *mut SharedInner<T>
    }
}

impl<T> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        let old = unsafe { self.inner.as_ref() }
            .count
            .fetch_add(1, Ordering::Relaxed);
        debug_assert!(old >= 1);
        Self { inner: self.inner }
    }
}

impl<T> Drop for Shared<T> {
    #[inline]
    fn drop(&mut self) {
        let old = unsafe { self.inner.as_ref() }
            .count
            .fetch_sub(1, Ordering::Release);
        if old != 1 {
            return;
        }
        // All preceding uses of the payload must happen-before the
        // deallocation below.
        fence(Ordering::Acquire);
        drop(unsafe { Box::from_raw(self.inner.as_ptr()) });
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &self.inner.as_ref().data }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        (**self).fmt(f)
    }
}

// The handle only carries a pointer to the payload, so its thread
// safety is exactly the payload's.
unsafe impl<T: Send + Sync> Send for Shared<T> {}
unsafe impl<T: Send + Sync> Sync for Shared<T> {}

/// An intrusive doubly-linked list that shares ownership of its
/// members. Sentinels are boxed so the list itself may move freely.
/// Not concurrent safe; a single thread owns all mutations.
pub struct SharedList<T, A: Adapter> {
    len: usize,
    head: Box<ListHead<T, A>>,
    tail: Box<ListHead<T, A>>,
    _t: PhantomData<T>,
}

impl<T, A: Adapter> SharedList<T, A> {
    pub fn new() -> Self {
        let mut head = Box::new(ListHead::new());
        let mut tail = Box::new(ListHead::new());
        let ok = ListHead::insert_after(&mut head, NonNull::from(&mut *tail));
        debug_assert!(ok);
        Self {
            len: 0,
            head,
            tail,
            _t: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        debug_assert_eq!(
            self.head.next == Some(NonNull::from(&*self.tail)),
            self.len == 0
        );
        self.len == 0
    }

    #[inline]
    fn node_of(me: &Shared<T>) -> NonNull<ListHead<T, A>> {
        let owner = unsafe { NonNull::new_unchecked(Shared::data_ptr(me) as *mut T) };
        unsafe { A::link_of(owner) }
    }

    /// Appends `me`; the list takes one count. Returns false if the
    /// node is already linked somewhere.
    pub fn push_back(&mut self, me: Shared<T>) -> bool {
        let node = Self::node_of(&me);
        if !ListHead::insert_before(&mut self.tail, node) {
            return false;
        }
        mem::forget(me);
        self.len += 1;
        true
    }

    pub fn pop_front(&mut self) -> Option<Shared<T>> {
        if self.is_empty() {
            return None;
        }
        let node = self.head.next.expect("Corrupted list: head lost its next");
        debug_assert_ne!(node, NonNull::from(&*self.tail));
        let ok = ListHead::detach(node);
        debug_assert!(ok);
        self.len -= 1;
        let owner: NonNull<T> = unsafe { A::owner_of(node) };
        // Adopts the count push_back left with the list.
        Some(unsafe { Shared::from_data_ptr(owner.as_ptr()) })
    }

    /// Unlinks `me` from this list. The caller must only pass members
    /// of this list; passing a member of another list corrupts both.
    pub fn detach(&mut self, me: &Shared<T>) -> bool {
        if !ListHead::detach(Self::node_of(me)) {
            return false;
        }
        self.len -= 1;
        unsafe { Shared::decrement_strong_count(me) };
        true
    }

    pub fn iter(&self) -> SharedListIterator<'_, T, A> {
        SharedListIterator {
            it: ListIterator::new(&self.head, Some(NonNull::from(&*self.tail))),
            _list: PhantomData,
        }
    }

    pub fn clear(&mut self) -> usize {
        let mut n = 0;
        while self.pop_front().is_some() {
            n += 1;
        }
        n
    }
}

impl<T, A: Adapter> Drop for SharedList<T, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, A: Adapter> Default for SharedList<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SharedListIterator<'a, T, A: Adapter> {
    it: ListIterator<T, A>,
    _list: PhantomData<&'a SharedList<T, A>>,
}

impl<'a, T, A: Adapter> Iterator for SharedListIterator<'a, T, A> {
    type Item = Shared<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.it.next()?;
        let owner: NonNull<T> = unsafe { A::owner_of(node) };
        Some(unsafe { Shared::clone_from_data_ptr(owner.as_ptr()) })
    }
}
