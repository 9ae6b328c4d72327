//! Classification of the calling worker and per-thread identity.
//!
//! The pool treats the two worker kinds differently: a standard worker is a
//! long-lived OS thread whose thread-local storage is a useful cache, while
//! a lightweight worker is one of many tasks multiplexed onto few OS threads,
//! where thread-local affinity recycles almost nothing.
//!
//! Detection is a capability query resolved once per process. When the
//! capability is absent (the crate is built without the `tokio` feature),
//! classification degrades to always reporting [`Kind::Standard`] rather
//! than failing.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    OnceLock,
};
use tracing::debug;

/// The kind of worker executing the current call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// A conventional OS-scheduled thread.
    Standard,
    /// A cooperatively-scheduled task, many of which may share one OS thread.
    Lightweight,
}

impl Kind {
    /// Classify the calling execution context.
    ///
    /// With the `tokio` feature enabled, any call made from within a tokio
    /// runtime is classified as [`Kind::Lightweight`]. Without the feature,
    /// every call is [`Kind::Standard`].
    #[inline]
    pub fn current() -> Self {
        classifier()()
    }
}

type ClassifierFn = fn() -> Kind;

fn classifier() -> ClassifierFn {
    static FN: OnceLock<ClassifierFn> = OnceLock::new();
    *FN.get_or_init(|| {
        debug!(
            lightweight_detection = cfg!(feature = "tokio"),
            "resolved worker classifier"
        );
        detect()
    })
}

cfg_if::cfg_if! {
    if #[cfg(feature = "tokio")] {
        fn detect() -> ClassifierFn {
            || {
                if tokio::runtime::Handle::try_current().is_ok() {
                    Kind::Lightweight
                } else {
                    Kind::Standard
                }
            }
        }
    } else {
        fn detect() -> ClassifierFn {
            || Kind::Standard
        }
    }
}

/// Stable integer identity of the calling thread.
///
/// Assigned from a process-wide counter the first time a thread asks, then
/// fixed for the thread's lifetime. Identities are distinct across live
/// threads, which is all the stripe probe needs.
pub(crate) fn identity() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    thread_local! {
        static IDENTITY: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    IDENTITY.with(|id| *id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_stable_within_thread() {
        assert_eq!(identity(), identity());
    }

    #[test]
    fn test_identity_distinct_across_threads() {
        let mine = identity();
        let other = std::thread::spawn(identity).join().unwrap();
        assert_ne!(mine, other);
    }

    #[test]
    fn test_standard_outside_runtime() {
        assert_eq!(Kind::current(), Kind::Standard);
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn test_lightweight_inside_runtime() {
        assert_eq!(Kind::current(), Kind::Lightweight);
    }
}
