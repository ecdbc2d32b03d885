//! Isolate - 隔離された並行実行
//!
//! - **link**: worker と subordinate の failure-propagation linkage
//! - **invoke**: caller / supervisor / worker による隔離実行
//! - **map**: 入力順を保つ並行 map（全体を 1 回の invoke で包む）

pub mod invoke;
pub mod link;
pub mod map;

pub use self::invoke::{Invoker, invoke};
pub use self::link::{LinkedHandle, spawn_linked};
pub use self::map::{parallel_map, parallel_map_with_timeout, try_parallel_map};

use crate::domain::ExitReason;

/// Terminate the current unit with `reason`.
///
/// Inside a worker the invocation reports `Exit(reason)`; inside a linked
/// subordinate the owning worker goes down with the same reason.
///
/// This unwinds without running the panic hook, so a deliberate exit
/// prints nothing to stderr.
pub fn exit(reason: ExitReason) -> ! {
    std::panic::resume_unwind(Box::new(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn leave() -> u32 {
        exit(ExitReason::custom("done"))
    }

    #[test]
    fn exit_unwinds_without_the_panic_hook() {
        let hooked = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hooked);
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if info.payload().is::<ExitReason>() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let payload = std::panic::catch_unwind(leave).unwrap_err();
        std::panic::set_hook(previous);

        assert_eq!(hooked.load(Ordering::SeqCst), 0);
        assert_eq!(ExitReason::from_panic(payload), ExitReason::custom("done"));
    }
}
