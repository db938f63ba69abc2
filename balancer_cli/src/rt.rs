//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall; macOS mlockall).

use crate::cli::RtLock;

#[cfg(target_os = "linux")]
/// Capacity of cpu_set_t in CPU indices (bits).
const MAX_CPUSET_BITS: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock, rt_cpu: Option<usize>) {
    use libc::{
        CPU_ISSET, CPU_SET, CPU_ZERO, SCHED_FIFO, sched_get_priority_max, sched_get_priority_min,
        sched_param, sched_setscheduler,
    };
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }

    // Apply process memory locking according to the selected mode.
    #[inline]
    fn try_apply_mem_lock(lock: RtLock) -> eyre::Result<()> {
        use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};

        #[inline]
        fn lock_with(flags: libc::c_int) -> std::io::Result<()> {
            if unsafe { mlockall(flags) } != 0 {
                Err(std::io::Error::last_os_error())
            } else {
                Ok(())
            }
        }

        let attempted_all = matches!(lock, RtLock::All);
        let result = match lock {
            RtLock::None => return Ok(()),
            RtLock::Current => lock_with(MCL_CURRENT),
            RtLock::All => lock_with(MCL_CURRENT | MCL_FUTURE),
        };
        let Err(err) = result else { return Ok(()) };

        let retryable =
            matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM);
        // Fallback: if All failed due to permission or memory, try Current
        if attempted_all && retryable && lock_with(MCL_CURRENT).is_ok() {
            return Ok(());
        }
        let mut msg = format!(
            "mlockall({}) failed: {err}",
            if attempted_all { "current|future" } else { "current" },
        );
        if retryable {
            msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
        }
        Err(eyre::eyre!(msg))
    }

    // Apply SCHED_FIFO priority, clamped to the system range.
    #[inline]
    fn try_apply_fifo_priority(prio: Option<i32>) -> eyre::Result<()> {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let has_cap = status.lines().any(|line| {
                if line.starts_with("CapEff:") || line.starts_with("CapPrm:") {
                    if let Some(hex) = line.split_whitespace().nth(1)
                        && let Ok(caps) = u64::from_str_radix(hex, 16)
                    {
                        // CAP_SYS_NICE
                        return caps & 0x800000 != 0;
                    }
                }
                false
            });
            if !has_cap && unsafe { libc::geteuid() } != 0 {
                return Err(eyre::eyre!(
                    "Insufficient privileges for SCHED_FIFO: needs CAP_SYS_NICE or root. \
                    Hint: run with 'sudo' or grant the capability: \
                    'sudo setcap cap_sys_nice=ep /path/to/balancer'"
                ));
            }
        }

        let (min, max) = unsafe {
            let min = sched_get_priority_min(SCHED_FIFO);
            let max = sched_get_priority_max(SCHED_FIFO);
            if min < 0 || max < 0 { (1, 99) } else { (min, max) }
        };
        let param = sched_param {
            sched_priority: prio.unwrap_or(max).clamp(min, max),
        };
        if unsafe { sched_setscheduler(0, SCHED_FIFO, &param) } != 0 {
            Err(eyre::eyre!(std::io::Error::last_os_error()))
        } else {
            Ok(())
        }
    }

    // Pin process to a single CPU if permitted by the current affinity mask.
    #[inline]
    fn try_apply_affinity(rt_cpu: Option<usize>) -> eyre::Result<()> {
        let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if online < 1 {
            eyre::bail!("_SC_NPROCESSORS_ONLN < 1");
        }
        let target = rt_cpu.unwrap_or(0);
        if target as libc::c_long >= online {
            eyre::bail!("requested CPU {target} >= online {online}");
        }
        if target >= MAX_CPUSET_BITS {
            eyre::bail!("requested CPU {target} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
        }
        let mut allowed: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        unsafe { CPU_ZERO(&mut allowed) };
        let rc = unsafe {
            libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut allowed)
        };
        if rc == 0 && !unsafe { CPU_ISSET(target, &allowed) } {
            eyre::bail!("CPU {target} not permitted by current affinity mask");
        }
        let mut desired: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        unsafe {
            CPU_ZERO(&mut desired);
            CPU_SET(target, &mut desired);
        }
        let rc =
            unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &desired) };
        if rc != 0 {
            Err(eyre::eyre!(std::io::Error::last_os_error()))
        } else {
            Ok(())
        }
    }

    RT_ONCE.get_or_init(|| {
        match try_apply_mem_lock(lock) {
            Ok(()) => tracing::info!(mode = ?lock, "RT: memory lock applied"),
            Err(err) => tracing::warn!(error = %err, "mlockall failed"),
        }
        if let Err(err) = try_apply_fifo_priority(prio) {
            tracing::warn!(prio = ?prio, error = %err, "sched_setscheduler(SCHED_FIFO) failed");
        }
        if let Err(err) = try_apply_affinity(rt_cpu) {
            tracing::warn!(error = %err, "affinity not applied");
        }
    });
}

#[cfg(target_os = "macos")]
pub fn setup_rt_once(rt: bool, lock: RtLock) {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();
    if !rt {
        return;
    }
    RT_ONCE.get_or_init(|| {
        let flags = match lock {
            RtLock::None => {
                tracing::info!("RT: memory locking disabled (none)");
                return;
            }
            RtLock::Current => MCL_CURRENT,
            RtLock::All => MCL_CURRENT | MCL_FUTURE,
        };
        if unsafe { mlockall(flags) } != 0 {
            let err = std::io::Error::last_os_error();
            tracing::warn!(mode = ?lock, error = %err, "mlockall failed");
        } else {
            tracing::info!(mode = ?lock, "RT: memory lock applied");
        }
        tracing::warn!("macOS does not support SCHED_FIFO or affinity; only mlockall applied");
    });
}
