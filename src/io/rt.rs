// src/io/rt.rs
//
// Reader-thread priority elevation. The burst pattern at 2,500 frames/s
// leaves no slack for scheduler latency, so the reader asks for the highest
// class the host permits and degrades quietly when it may not.

#[cfg(target_os = "linux")]
pub(crate) fn promote_current_thread() {
    // SAFETY: pid 0 targets the calling thread; sched_param is fully
    // initialised before each call.
    unsafe {
        let max_fifo = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if max_fifo > 0 {
            let param = libc::sched_param {
                sched_priority: max_fifo,
            };
            if libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) == 0 {
                log::debug!("reader thread promoted to SCHED_FIFO {}", max_fifo);
                return;
            }
        }

        let max_rr = libc::sched_get_priority_max(libc::SCHED_RR);
        if max_rr > 0 {
            let param = libc::sched_param {
                sched_priority: max_rr,
            };
            if libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_RR, &param) == 0 {
                log::debug!("reader thread promoted to SCHED_RR {}", max_rr);
                return;
            }
        }

        // Unprivileged fallback: best niceness we can get.
        *libc::__errno_location() = 0;
        libc::nice(-20);
        log::debug!("reader thread left at default class (RT requires CAP_SYS_NICE)");
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn promote_current_thread() {
    log::debug!("reader thread priority elevation not supported on this platform");
}
