//! In-process synchronization primitives.

pub mod spsc;

/// CPU time consumed so far by the calling thread.
#[cfg(test)]
pub(crate) fn thread_cpu_time() -> std::time::Duration {
    use rustix::time::{ClockId, clock_gettime};

    let now = clock_gettime(ClockId::ThreadCPUTime);
    std::time::Duration::new(
        u64::try_from(now.tv_sec).unwrap_or(0),
        u32::try_from(now.tv_nsec).unwrap_or(0),
    )
}
