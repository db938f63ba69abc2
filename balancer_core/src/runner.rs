//! Blocking loop runner: paces ticks at the configured rate and publishes
//! telemetry for diagnostics consumers.

use crate::actuator::ActuatorCfg;
use crate::error::Result;
use crate::estimator::EstimatorCfg;
use crate::{LoopCfg, Snapshot};
use balancer_traits::clock::Clock;
use balancer_traits::{AnalogIn, MotorDrive};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything `run` needs beyond the hardware itself.
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    pub cfg: LoopCfg,
    pub estimator: EstimatorCfg,
    pub actuator: ActuatorCfg,
    /// Suppress the control law; pipeline and telemetry still run.
    pub diagnostics: bool,
    /// Stop after this many ticks (None runs until shutdown).
    pub max_ticks: Option<u64>,
}

/// Final counters of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub overruns: u64,
}

/// Run the control loop until shutdown or the tick budget is exhausted.
///
/// Each tick's deadline is fixed at tick entry, before any sensor read or
/// pipeline work, so jitter inside the tick does not shift the schedule.
/// A tick that misses its deadline runs immediately rather than being
/// skipped; the loop counts it as an overrun. Motors are stopped before
/// the first tick and again on every exit path.
pub fn run<A, M>(
    adc: A,
    motor: M,
    params: RunParams,
    shutdown: Arc<AtomicBool>,
    telemetry: Option<Arc<Mutex<Snapshot>>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<LoopStats>
where
    A: AnalogIn + 'static,
    M: MotorDrive + 'static,
{
    let mut lp = crate::build_control_loop(
        adc,
        motor,
        params.cfg,
        params.estimator,
        params.actuator,
        clock,
        params.diagnostics,
    )?;
    let clock = Arc::clone(&lp.clock);
    let period = Duration::from_micros(lp.period_us());
    lp.motor_stop()?;
    tracing::info!(
        period_us = lp.period_us(),
        diagnostics = params.diagnostics,
        "control loop start"
    );

    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            break;
        }
        if let Some(max) = params.max_ticks
            && lp.ticks() >= max
        {
            break;
        }
        let entry = clock.now();
        let deadline = entry + period;
        if let Err(e) = lp.step() {
            if let Err(stop_err) = lp.motor_stop() {
                tracing::warn!(error = %stop_err, "motor stop failed after loop error");
            }
            return Err(e);
        }
        if let Some(t) = &telemetry
            && let Ok(mut slot) = t.lock()
        {
            *slot = lp.snapshot();
        }
        let now = clock.now();
        if now < deadline {
            clock.sleep(deadline - now);
        }
    }

    let stats = LoopStats {
        ticks: lp.ticks(),
        overruns: lp.overrun_count(),
    };
    if let Err(e) = lp.motor_stop() {
        tracing::warn!(error = %e, "motor stop failed on exit");
    }
    tracing::info!(
        ticks = stats.ticks,
        overruns = stats.overruns,
        "control loop stop"
    );
    Ok(stats)
}
