//! Striped lock-free free lists for recycled values.
//!
//! # Overview
//!
//! A [`StripedPool`] partitions its free values across a power-of-two number
//! of independent lock-free stacks ("stripes"). Callers are spread across
//! stripes by a hash of their thread identity, which keeps unrelated workers
//! off each other's cache lines, and every value released to the pool goes
//! back to the stripe it was first issued from, regardless of which worker
//! performs the release.
//!
//! # Algorithm
//!
//! Each stripe head is an atomic pointer to a singly linked list of nodes.
//! Acquire pops the head with a compare-exchange retry loop, or constructs a
//! fresh value when the stripe is empty. Release wraps the value in a new
//! node and pushes it with the same retry discipline. No operation blocks,
//! takes a lock, or touches more than one head slot.
//!
//! Memory reclamation is epoch-based: a popped node may still be observed by
//! a concurrent pop, so its memory is freed only once all pinned readers
//! have moved on. The popped *value* is moved out eagerly; only the node
//! shell is deferred.

use crate::{
    pool::{Origin, Pooled},
    worker, Error,
};
use crossbeam_epoch::{self as epoch, Atomic, Owned};
use std::{mem::ManuallyDrop, ptr, sync::atomic::Ordering};
use tracing::debug;

/// Number of array slots separating two logical stripe heads.
///
/// Adjacent heads are kept at least a cache line apart so that two stripes
/// updated by different cores never invalidate each other.
const PADDING: usize = 16;

/// log2 of [`PADDING`], used to shift the stripe mask into padded index space.
const PADDING_SHIFT: u32 = PADDING.trailing_zeros();

/// Fractional golden ratio, the multiplicative constant of the probe hash.
const GOLDEN_RATIO: u32 = 0x9e37_79b9;

/// Round a requested stripe count up to the next power of two.
///
/// Rejects zero, and any count whose rounded value or padded head-array
/// length would overflow `usize`.
pub(crate) fn round_stripes(requested: usize) -> Result<usize, Error> {
    if requested == 0 {
        return Err(Error::ZeroStripes);
    }
    let stripes = requested
        .checked_next_power_of_two()
        .ok_or(Error::StripeOverflow(requested))?;
    if stripes.checked_mul(PADDING).is_none() {
        return Err(Error::StripeOverflow(requested));
    }
    Ok(stripes)
}

/// Map a worker identity to a padded head-slot index.
///
/// Multiplicative hash of the identity's low bits followed by a three-step
/// xorshift mix. `mask` is `(stripes - 1) << PADDING_SHIFT`, so the result
/// is always a multiple of [`PADDING`] below the array length.
#[inline]
fn probe(identity: u64, mask: usize) -> usize {
    let mut hash = (identity as u32).wrapping_mul(GOLDEN_RATIO);
    hash ^= hash << 13;
    hash ^= hash >> 17;
    hash ^= hash << 5;
    hash as usize & mask
}

/// Intrusive cell linking one recycled value into a stripe's free list.
///
/// The value is wrapped in [`ManuallyDrop`] because ownership leaves the
/// node on a successful pop: the value is read out and the node shell is
/// reclaimed without running the value's destructor.
struct Node<T> {
    value: ManuallyDrop<T>,
    next: Atomic<Node<T>>,
}

/// A fixed set of independent lock-free free lists.
///
/// Safe under any number of concurrent, uncoordinated callers. The only
/// shared mutable state is the head-slot array, and every mutation of it
/// goes through a compare-exchange.
pub struct StripedPool<T> {
    /// Head slots. One live slot every [`PADDING`] entries; the slots in
    /// between exist purely as false-sharing separation and are never
    /// touched.
    heads: Box<[Atomic<Node<T>>]>,

    /// `(stripes - 1) << PADDING_SHIFT`, applied to the probe hash.
    mask: usize,

    /// Logical stripe count (power of two).
    stripes: usize,
}

// SAFETY: values cross threads only through the CAS-mediated list
// operations, so the pool can be sent and shared whenever the pooled
// values themselves can be sent.
unsafe impl<T: Send> Send for StripedPool<T> {}
unsafe impl<T: Send> Sync for StripedPool<T> {}

impl<T: Send> StripedPool<T> {
    /// Create a pool with `requested` stripes, rounded up to the next power
    /// of two.
    pub fn new(requested: usize) -> Result<Self, Error> {
        Ok(Self::from_rounded(round_stripes(requested)?))
    }

    /// Create a pool from an already-validated power-of-two stripe count.
    pub(crate) fn from_rounded(stripes: usize) -> Self {
        debug_assert!(stripes.is_power_of_two());
        let heads = (0..stripes * PADDING).map(|_| Atomic::null()).collect();
        debug!(stripes, "initialized striped pool");
        Self {
            heads,
            mask: (stripes - 1) << PADDING_SHIFT,
            stripes,
        }
    }

    /// The number of logical stripes.
    pub fn stripes(&self) -> usize {
        self.stripes
    }

    /// Take a value from the stripe selected by the calling worker's
    /// identity, constructing a fresh one via `create` when that stripe is
    /// empty.
    ///
    /// The stripe is re-probed on every call, so a worker whose identity
    /// changes (or whose hash collides differently over time) may draw from
    /// different stripes across calls. The invariant that matters is fixed
    /// at issue time: the returned handle is tagged with the stripe it came
    /// from, and [`StripedPool::release`] honors that tag.
    pub fn acquire(&self, create: impl FnOnce() -> T) -> Pooled<T> {
        self.acquire_at(probe(worker::identity(), self.mask), create)
    }

    /// Return a value to the stripe recorded in its origin tag.
    ///
    /// The destination is decided by the tag alone, never by the releasing
    /// thread: a value acquired on stripe `k` by one worker, handed to
    /// another, and released there still lands on stripe `k`.
    pub fn release(&self, pooled: Pooled<T>) {
        let (value, origin) = pooled.into_parts();
        match origin {
            Origin::Stripe(slot) => self.release_to(slot, value),
            // A thread-local handle released into a standalone striped pool
            // carries no stripe; the value simply drops.
            Origin::Local => {}
        }
    }

    pub(crate) fn acquire_at(&self, slot: usize, create: impl FnOnce() -> T) -> Pooled<T> {
        let guard = epoch::pin();
        let head = &self.heads[slot];
        let mut current = head.load(Ordering::Acquire, &guard);
        loop {
            // SAFETY: a non-null head was linked by a release on this stripe
            // and cannot be reclaimed while this guard is pinned.
            let Some(node) = (unsafe { current.as_ref() }) else {
                // Empty stripe: nothing is linked, so a fresh value can be
                // handed out with no further synchronization.
                return Pooled::striped(create(), slot);
            };
            let next = node.next.load(Ordering::Relaxed, &guard);
            match head.compare_exchange(current, next, Ordering::Acquire, Ordering::Acquire, &guard)
            {
                Ok(_) => {
                    // SAFETY: the successful exchange unlinked `current`, so
                    // this thread now exclusively owns its value. The node
                    // shell is freed once all pinned readers move on; the
                    // value's destructor does not run with it.
                    let value = unsafe { ManuallyDrop::into_inner(ptr::read(&node.value)) };
                    unsafe { guard.defer_destroy(current) };
                    return Pooled::striped(value, slot);
                }
                Err(err) => current = err.current,
            }
        }
    }

    pub(crate) fn release_to(&self, slot: usize, value: T) {
        let guard = epoch::pin();
        let head = &self.heads[slot];
        let mut node = Owned::new(Node {
            value: ManuallyDrop::new(value),
            next: Atomic::null(),
        });
        let mut current = head.load(Ordering::Relaxed, &guard);
        loop {
            node.next.store(current, Ordering::Relaxed);
            match head.compare_exchange(current, node, Ordering::Release, Ordering::Relaxed, &guard)
            {
                Ok(_) => return,
                Err(err) => {
                    current = err.current;
                    node = err.new;
                }
            }
        }
    }
}

impl<T> Drop for StripedPool<T> {
    fn drop(&mut self) {
        // SAFETY: exclusive access means no other thread can be pinned
        // inside an operation on this pool, so an unprotected guard is sound
        // and linked nodes can be freed immediately.
        let guard = unsafe { epoch::unprotected() };
        for head in self.heads.iter().step_by(PADDING) {
            let mut current = head.load(Ordering::Relaxed, guard);
            while let Some(node) = unsafe { current.as_ref() } {
                let next = node.next.load(Ordering::Relaxed, guard);
                // SAFETY: still linked, so the stripe owns both the node and
                // its value; drop both.
                let mut node = unsafe { current.into_owned() };
                unsafe { ManuallyDrop::drop(&mut node.value) };
                drop(node);
                current = next;
            }
        }
    }
}
