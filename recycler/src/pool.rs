//! Hybrid dispatch between the thread-local and striped sub-pools.
//!
//! # Overview
//!
//! [`HybridPool`] routes every acquire and release by the kind of worker
//! making the call, never by the value itself. Standard workers keep one
//! cached value in a thread-local slot declared with [`local_slot!`];
//! lightweight workers share a [`StripedPool`] built lazily on first use.
//!
//! Routing on release is driven entirely by the [`Pooled`] handle's origin
//! tag, so a value acquired on one worker and released by another always
//! finds its way home.

use crate::{
    striped::{self, StripedPool},
    worker::Kind,
    Error,
};
use std::{
    cell::RefCell,
    ops::{Deref, DerefMut},
    sync::OnceLock,
    thread::LocalKey,
};

/// Where a pooled value was issued from. Fixed when the value is handed out
/// and never modified afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Issued from the calling thread's cached slot.
    Local,
    /// Issued from the striped pool, at the recorded head-slot index.
    Stripe(usize),
}

/// A value on loan from a pool.
///
/// Dereferences to the underlying value. Dropping the handle without
/// releasing it simply drops the value; the pool repopulates lazily.
#[derive(Debug)]
pub struct Pooled<T> {
    value: T,
    origin: Origin,
}

impl<T> Pooled<T> {
    pub(crate) fn local(value: T) -> Self {
        Self {
            value,
            origin: Origin::Local,
        }
    }

    pub(crate) fn striped(value: T, slot: usize) -> Self {
        Self {
            value,
            origin: Origin::Stripe(slot),
        }
    }

    pub(crate) fn into_parts(self) -> (T, Origin) {
        (self.value, self.origin)
    }

    #[cfg(test)]
    pub(crate) fn origin(&self) -> Origin {
        self.origin
    }

    /// Detach the value from its pool permanently.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// Storage declared by [`local_slot!`] for one per-thread cached value.
pub type LocalCell<T> = RefCell<Option<T>>;

/// Declare the thread-local slot backing a [`HybridPool`]'s standard-worker
/// path.
///
/// ```ignore
/// local_slot!(static SLOT: Vec<u8>);
/// ```
///
/// Each pool should be given its own slot; two pools sharing one slot would
/// recycle each other's values.
#[macro_export]
macro_rules! local_slot {
    (static $name:ident : $ty:ty) => {
        ::std::thread_local! {
            static $name: $crate::LocalCell<$ty> =
                const { ::std::cell::RefCell::new(::core::option::Option::None) };
        }
    };
}

/// Buffer pool that routes callers by worker kind.
///
/// Standard workers get the conventional treatment: one reusable value per
/// long-lived thread, cached in the slot declared with [`local_slot!`].
/// Lightweight workers migrate across OS threads and gain nothing from
/// thread-local affinity, so they share a [`StripedPool`] instead.
///
/// The striped sub-pool is constructed at most once per [`HybridPool`], on
/// first use, and shared by all callers for the pool's lifetime.
pub struct HybridPool<T: 'static> {
    local: &'static LocalKey<LocalCell<T>>,
    stripes: usize,
    striped: OnceLock<StripedPool<T>>,
}

impl<T: Send + 'static> HybridPool<T> {
    /// Create a pool with `stripes` stripes (rounded up to the next power of
    /// two) for lightweight workers, backed by `local` for standard workers.
    ///
    /// The striped sub-pool is built lazily, but sizing is validated here so
    /// that misconfiguration surfaces at construction rather than on some
    /// later acquire.
    pub fn new(stripes: usize, local: &'static LocalKey<LocalCell<T>>) -> Result<Self, Error> {
        let stripes = striped::round_stripes(stripes)?;
        Ok(Self {
            local,
            stripes,
            striped: OnceLock::new(),
        })
    }

    /// Borrow a value, constructing a fresh one via `create` when nothing is
    /// cached for the calling worker. Never blocks and never fails.
    ///
    /// Values come back exactly as they were released; callers reset state
    /// as needed.
    pub fn acquire(&self, create: impl FnOnce() -> T) -> Pooled<T> {
        match Kind::current() {
            Kind::Lightweight => self.striped().acquire(create),
            Kind::Standard => {
                let cached = self.local.with(|cell| cell.borrow_mut().take());
                Pooled::local(cached.unwrap_or_else(create))
            }
        }
    }

    /// Return a borrowed value to wherever it was issued from.
    pub fn release(&self, pooled: Pooled<T>) {
        let (value, origin) = pooled.into_parts();
        match origin {
            Origin::Stripe(slot) => self.striped().release_to(slot, value),
            Origin::Local => self.local.with(|cell| {
                let mut slot = cell.borrow_mut();
                // The slot was already refilled by an earlier release on
                // this thread; the extra value drops.
                if slot.is_none() {
                    *slot = Some(value);
                }
            }),
        }
    }

    fn striped(&self) -> &StripedPool<T> {
        self.striped
            .get_or_init(|| StripedPool::from_rounded(self.stripes))
    }
}

/// Stripe count matching the host's available parallelism.
pub fn default_stripes() -> usize {
    std::thread::available_parallelism().map_or(1, usize::from)
}
