//! Recycle scratch buffers across standard and lightweight workers.
//!
//! # Overview
//!
//! Serialization-style workloads churn through scratch buffers that are
//! expensive to allocate and trivially reusable. For a long-lived OS thread
//! the cheapest cache is a thread-local slot. Lightweight tasks break that
//! assumption: thousands of them migrate across a few OS threads, so
//! thread-local affinity recycles almost nothing.
//!
//! [`HybridPool`] routes each call by the kind of worker making it.
//! Standard workers use a per-thread cached slot declared with
//! [`local_slot!`]. Lightweight workers share a [`StripedPool`]: a fixed,
//! power-of-two number of independent lock-free free lists, selected by a
//! hash of the calling thread's identity, with every value returning to the
//! stripe it was first issued from no matter which worker releases it.
//!
//! All operations are non-blocking. The striped pool's only synchronization
//! is a compare-exchange retry loop per stripe head, and no operation ever
//! touches more than one stripe.
//!
//! # Example
//!
//! ```
//! use recycler::HybridPool;
//!
//! recycler::local_slot!(static SLOT: Vec<u8>);
//!
//! let pool: HybridPool<Vec<u8>> = HybridPool::new(8, &SLOT).unwrap();
//! let mut buf = pool.acquire(|| Vec::with_capacity(4096));
//! buf.extend_from_slice(b"scratch");
//! pool.release(buf);
//!
//! // The next acquire on this thread hands the same buffer back.
//! let buf = pool.acquire(|| Vec::with_capacity(4096));
//! assert_eq!(&*buf, b"scratch");
//! ```

mod error;
pub use error::Error;
mod pool;
pub use pool::{default_stripes, HybridPool, LocalCell, Pooled};
mod striped;
pub use striped::StripedPool;
mod worker;
pub use worker::Kind;
