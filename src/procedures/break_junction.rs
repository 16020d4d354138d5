//! Break-junction electromigration controller.
//!
//! The controller owns a voltage source and current reader for the duration
//! of a session and alternates between two phases:
//!
//! 1. **Probe** ([`BreakJunctionController::measure_resistance`]): sweep a
//!    low bias from 0 to `stop_voltage`, fit `I = m·V + b` over the sweep,
//!    and take `1/m` as the present junction resistance.
//! 2. **Ramp** ([`BreakJunctionController::break_junction`]): step the bias
//!    from `start_voltage` toward a ceiling, watching each sample's `V/I`
//!    against a tolerance band around the previous sample's `V/I`. Leaving
//!    the band is the electromigration event; the ramp stops immediately.
//!    Completed (non-breaking) attempts are counted per ceiling and the
//!    ceiling grows by `delta_break_voltage` every `passes` attempts when
//!    enabled.
//!
//! The session loops probe → ramp until the resistance target is reached,
//! a fit slope goes negative, a detected break is confirmed by the next
//! probe, or an abort is requested. Every terminal path drives the output
//! back to 0 V; hardware failures propagate after a best-effort zeroing.

use crate::config::JunctionParams;
use crate::data::fit::{fit_linear, FitError};
use crate::data::storage::{RecordPhase, RecordSink, SnapshotSink};
use crate::hardware::{CurrentReader, VoltageSource};
use crate::procedures::{AbortFlag, SessionOutcome};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Final report of a completed session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// How the session ended.
    pub outcome: SessionOutcome,
    /// Last resistance estimate, in ohms.
    pub final_resistance: f64,
    /// Number of probe/ramp cycles performed.
    pub cycles: u64,
}

/// Mutable session state.
struct BreakState {
    /// Present resistance estimate in ohms. Only meaningful after the first
    /// probe fit; initialised to 0 so no terminal check can fire before it.
    resistance: f64,
    /// Ceiling of the current ramp attempts, in volts.
    ceiling: f64,
    /// Completed (non-breaking) attempts at the present ceiling.
    passes_at_ceiling: u32,
    /// Set when a ramp sample left the tolerance band. Never reset.
    current_dropped: bool,
    /// 1-based probe/ramp cycle counter.
    cycle: u64,
    /// Samples of the most recent ramp attempt, kept for trace snapshots.
    last_ramp: Vec<(f64, f64)>,
}

/// Iterative controller for electromigrating a metallic break junction.
pub struct BreakJunctionController {
    params: JunctionParams,
    source: Arc<dyn VoltageSource>,
    reader: Arc<dyn CurrentReader>,
    sink: Box<dyn RecordSink>,
    snapshots: Option<Box<dyn SnapshotSink>>,
    abort: AbortFlag,
    state: BreakState,
}

impl BreakJunctionController {
    /// Create a controller over the given hardware and record sink.
    pub fn new(
        params: JunctionParams,
        source: Arc<dyn VoltageSource>,
        reader: Arc<dyn CurrentReader>,
        sink: Box<dyn RecordSink>,
    ) -> Self {
        let ceiling = params.break_voltage;
        Self {
            params,
            source,
            reader,
            sink,
            snapshots: None,
            abort: AbortFlag::new(),
            state: BreakState {
                resistance: 0.0,
                ceiling,
                passes_at_ceiling: 0,
                current_dropped: false,
                cycle: 0,
                last_ramp: Vec::new(),
            },
        }
    }

    /// Attach a snapshot sink that receives the final ramp trace when the
    /// session terminates.
    pub fn with_snapshots(mut self, snapshots: Box<dyn SnapshotSink>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Use an externally shared abort flag.
    pub fn with_abort(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    /// Present resistance estimate in ohms (0 until the first fit).
    pub fn resistance(&self) -> f64 {
        self.state.resistance
    }

    /// Run the session to completion.
    ///
    /// Expected terminations come back as an `Ok` report. A hardware or
    /// storage failure is an `Err`; the output is zeroed best-effort first,
    /// and if that zeroing call fails too, its error is attached as context.
    pub async fn run(&mut self) -> Result<SessionReport> {
        match self.run_inner().await {
            Ok(report) => Ok(report),
            Err(primary) => Err(self.zero_after_failure(primary).await),
        }
    }

    async fn run_inner(&mut self) -> Result<SessionReport> {
        info!(
            desired_resistance = self.params.desired_resistance,
            break_voltage = self.params.break_voltage,
            "break-junction session started"
        );

        let outcome = loop {
            self.state.cycle += 1;
            if let Some(outcome) = self.measure_resistance().await? {
                break outcome;
            }
            if let Some(outcome) = self.break_junction().await? {
                break outcome;
            }
        };

        self.sink
            .record_terminal(self.state.cycle, outcome.message(), self.state.resistance)
            .await?;
        self.sink.flush().await?;

        if let Some(snapshots) = &self.snapshots {
            if !self.state.last_ramp.is_empty() {
                snapshots
                    .save_trace(outcome.label(), &self.state.last_ramp)
                    .await?;
            }
        }

        info!(
            message = outcome.message(),
            resistance_ohms = self.state.resistance,
            cycles = self.state.cycle,
            "session finished"
        );

        Ok(SessionReport {
            outcome,
            final_resistance: self.state.resistance,
            cycles: self.state.cycle,
        })
    }

    /// Probe the present junction resistance with a low-voltage sweep.
    ///
    /// Returns `Some(outcome)` when a terminal condition fired after the
    /// probe, `None` when the session should proceed to ramping.
    pub async fn measure_resistance(&mut self) -> Result<Option<SessionOutcome>> {
        if self.abort.is_triggered() {
            self.zero_output().await?;
            return Ok(Some(SessionOutcome::Aborted));
        }

        let points = self.params.steps as usize + 1;
        let mut voltages = Vec::with_capacity(points);
        let mut currents = Vec::with_capacity(points);

        for k in 0..points {
            let setpoint =
                self.params.stop_voltage * k as f64 / f64::from(self.params.steps);
            self.source
                .set_voltage(setpoint)
                .await
                .context("probe sweep: setting voltage failed")?;
            self.settle().await;
            let (v, i) = self
                .reader
                .read()
                .await
                .context("probe sweep: reading operating point failed")?;
            voltages.push(v);
            currents.push(i);
        }

        self.zero_output().await?;

        match fit_linear(&voltages, &currents) {
            Ok(fit) => {
                self.state.resistance = fit.resistance();
                debug!(
                    slope = fit.slope,
                    slope_err = fit.slope_err,
                    intercept = fit.intercept,
                    intercept_err = fit.intercept_err,
                    resistance_ohms = self.state.resistance,
                    "probe fit"
                );
            }
            Err(FitError::Degenerate) => {
                warn!("degenerate probe fit; keeping prior resistance estimate");
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            cycle = self.state.cycle,
            resistance_ohms = self.state.resistance,
            "resistance probed"
        );
        self.sink
            .record_resistance(self.state.cycle, RecordPhase::Probe, self.state.resistance)
            .await?;

        self.check_status().await
    }

    /// Terminal-condition guard, evaluated in fixed priority order after
    /// every probe. A hit zeroes the output before signalling.
    async fn check_status(&mut self) -> Result<Option<SessionOutcome>> {
        let outcome = if self.state.resistance >= self.params.desired_resistance {
            Some(SessionOutcome::TargetReached)
        } else if self.state.resistance < 0.0 {
            Some(SessionOutcome::NegativeSlope)
        } else if self.state.current_dropped {
            Some(SessionOutcome::CurrentDropped)
        } else if self.abort.is_triggered() {
            Some(SessionOutcome::Aborted)
        } else {
            None
        };

        if outcome.is_some() {
            self.zero_output().await?;
        }
        Ok(outcome)
    }

    /// Ramp toward the ceiling until a break is detected or a terminal
    /// condition fires.
    ///
    /// Returns `Some(outcome)` on a terminal condition; `None` hands control
    /// back to the probe loop (either a break was detected or an abort was
    /// requested, both of which the next probe adjudicates).
    pub async fn break_junction(&mut self) -> Result<Option<SessionOutcome>> {
        while !self.abort.is_triggered() && !self.state.current_dropped {
            let samples = self.ramp_attempt().await?;

            if samples.len() >= 4 {
                let voltages: Vec<f64> = samples.iter().map(|(v, _)| *v).collect();
                let currents: Vec<f64> = samples.iter().map(|(_, i)| *i).collect();
                match fit_linear(&voltages, &currents) {
                    Ok(fit) => {
                        self.state.resistance = fit.resistance();
                        debug!(
                            slope = fit.slope,
                            resistance_ohms = self.state.resistance,
                            "ramp fit"
                        );
                    }
                    Err(FitError::Degenerate) => {
                        warn!("degenerate ramp fit; keeping prior resistance estimate");
                    }
                    Err(e) => return Err(e.into()),
                }
                self.sink
                    .record_resistance(self.state.cycle, RecordPhase::Ramp, self.state.resistance)
                    .await?;
            }
            self.state.last_ramp = samples;

            self.zero_output().await?;

            if !self.state.current_dropped {
                self.state.passes_at_ceiling += 1;
                if self.state.passes_at_ceiling >= self.params.passes
                    && self.params.increase_break_voltage
                {
                    self.state.ceiling += self.params.delta_break_voltage;
                    self.state.passes_at_ceiling = 0;
                    info!(ceiling_volts = self.state.ceiling, "ramp ceiling raised");
                }
            }

            if self.state.resistance >= self.params.desired_resistance {
                self.zero_output().await?;
                return Ok(Some(SessionOutcome::TargetReached));
            }
            if self.state.resistance < 0.0 {
                self.zero_output().await?;
                return Ok(Some(SessionOutcome::NegativeSlope));
            }
        }

        Ok(None)
    }

    /// One ramp from `start_voltage` to the present ceiling.
    ///
    /// Stops early when the abort flag is raised or when a sample's `V/I`
    /// leaves the tolerance band around the previous sample's `V/I` (the
    /// break event, which also sets `current_dropped`).
    async fn ramp_attempt(&mut self) -> Result<Vec<(f64, f64)>> {
        let tolerance = self.params.deviation_tolerance();
        let mut samples: Vec<(f64, f64)> = Vec::new();
        let mut max_current = 0.0_f64;

        info!(
            ceiling_volts = self.state.ceiling,
            pass = self.state.passes_at_ceiling + 1,
            "ramp attempt started"
        );

        let mut step = 0u32;
        loop {
            let setpoint =
                self.params.start_voltage + f64::from(step) * self.params.delta_voltage;
            if setpoint > self.state.ceiling + 1e-9 {
                break;
            }
            if self.abort.is_triggered() {
                break;
            }

            self.source
                .set_voltage(setpoint)
                .await
                .context("ramp: setting voltage failed")?;
            self.settle().await;
            let (v, i) = self
                .reader
                .read()
                .await
                .context("ramp: reading operating point failed")?;

            max_current = max_current.max(i.abs());
            let percent_of_max = if max_current > 0.0 {
                100.0 * i.abs() / max_current
            } else {
                0.0
            };
            debug!(volts = v, amps = i, percent_of_max, "ramp sample");

            let previous = samples.last().copied();
            samples.push((v, i));

            if let Some((prev_v, prev_i)) = previous {
                let expected = prev_v / prev_i;
                if expected.is_finite() {
                    let measured = v / i;
                    let band = (expected * (1.0 - tolerance), expected * (1.0 + tolerance));
                    let (lo, hi) = if band.0 <= band.1 {
                        band
                    } else {
                        (band.1, band.0)
                    };
                    if !measured.is_finite() || measured < lo || measured > hi {
                        warn!(
                            expected_ohms = expected,
                            measured_ohms = measured,
                            volts = v,
                            "resistance left tolerance band; junction break detected"
                        );
                        self.state.current_dropped = true;
                        break;
                    }
                }
            }

            step += 1;
        }

        Ok(samples)
    }

    async fn settle(&self) {
        if !self.params.settle_time.is_zero() {
            tokio::time::sleep(self.params.settle_time).await;
        }
    }

    async fn zero_output(&self) -> Result<()> {
        self.source
            .set_voltage(0.0)
            .await
            .context("failed to return output to 0 V")
    }

    /// Best-effort zeroing after a hard failure. The primary error is
    /// returned either way; a second failure is attached as context.
    async fn zero_after_failure(&self, primary: anyhow::Error) -> anyhow::Error {
        match self.source.set_voltage(0.0).await {
            Ok(()) => primary,
            Err(zero_err) => {
                primary.context(format!("also failed to zero output afterwards: {zero_err}"))
            }
        }
    }
}
