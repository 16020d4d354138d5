//! Mock Hardware Implementations
//!
//! Simulated source-meter for running sessions and tests without physical
//! hardware. The mock keeps its state behind async-safe locks and records
//! every voltage setpoint so tests can assert on the exact command
//! sequence the controller issued.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::hardware::{CurrentReader, VoltageSource};

/// How the simulated junction answers a current readback.
#[derive(Debug, Clone, Copy)]
pub enum CurrentModel {
    /// Ideal resistor: `I = V / resistance`.
    Ohmic {
        /// Junction resistance in ohms.
        resistance: f64,
    },

    /// Ohmic until the bias first reaches `break_at_volts`; from then on the
    /// junction has electromigrated to `broken_resistance` and stays there.
    /// Models the sudden, irreversible resistance jump the controller must
    /// detect mid-ramp.
    OhmicWithBreak {
        /// Pre-break resistance in ohms.
        resistance: f64,
        /// Bias at which the junction breaks.
        break_at_volts: f64,
        /// Post-break resistance in ohms.
        broken_resistance: f64,
    },

    /// Current falls as the bias rises: `I = baseline - droop·V`. Produces a
    /// negative fitted slope.
    NegativeSlope {
        /// Current at zero bias, in amperes.
        baseline: f64,
        /// Current lost per volt, in A/V.
        droop: f64,
    },

    /// Readback latched at a fixed operating point regardless of the
    /// programmed bias, like a sense line stuck mid-scale. Every sweep
    /// sample is identical, so a line fit over the sweep is degenerate.
    Stuck {
        /// Reported voltage, in volts.
        volts: f64,
        /// Reported current, in amperes.
        amps: f64,
    },

    /// Every readback fails, simulating a communication fault. Setpoints
    /// still succeed so the safety zeroing path stays reachable.
    ReadFault,
}

/// Mock source-meter with a selectable junction model.
///
/// # Example
///
/// ```rust,ignore
/// let meter = Arc::new(MockSourceMeter::new(CurrentModel::Ohmic { resistance: 1e3 }));
/// meter.set_voltage(0.1).await?;
/// let (v, i) = meter.read().await?; // (0.1, 1e-4)
/// ```
pub struct MockSourceMeter {
    model: RwLock<CurrentModel>,
    output_volts: RwLock<f64>,
    /// Latched once the bias has reached the break threshold.
    broken: RwLock<bool>,
    /// Fractional amplitude of uniform noise applied to readings (0 = off).
    noise: f64,
    setpoints: Arc<Mutex<Vec<f64>>>,
}

impl MockSourceMeter {
    /// Create a noiseless mock with the given junction model.
    pub fn new(model: CurrentModel) -> Self {
        Self {
            model: RwLock::new(model),
            output_volts: RwLock::new(0.0),
            broken: RwLock::new(false),
            noise: 0.0,
            setpoints: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add uniform relative noise of amplitude `fraction` to readings.
    pub fn with_noise(mut self, fraction: f64) -> Self {
        self.noise = fraction;
        self
    }

    /// Swap the junction model mid-session.
    pub async fn set_model(&self, model: CurrentModel) {
        *self.model.write().await = model;
    }

    /// Every setpoint passed to `set_voltage`, in call order.
    pub async fn setpoints(&self) -> Vec<f64> {
        self.setpoints.lock().await.clone()
    }

    fn current_for(&self, model: CurrentModel, volts: f64, broken: bool) -> Result<f64> {
        let ideal = match model {
            CurrentModel::Ohmic { resistance } => volts / resistance,
            CurrentModel::OhmicWithBreak {
                resistance,
                broken_resistance,
                ..
            } => {
                if broken {
                    volts / broken_resistance
                } else {
                    volts / resistance
                }
            }
            CurrentModel::NegativeSlope { baseline, droop } => baseline - droop * volts,
            CurrentModel::Stuck { amps, .. } => amps,
            CurrentModel::ReadFault => bail!("MockSourceMeter: simulated read fault"),
        };

        if self.noise == 0.0 {
            Ok(ideal)
        } else {
            let factor = 1.0 + rand::thread_rng().gen_range(-self.noise..=self.noise);
            Ok(ideal * factor)
        }
    }
}

#[async_trait]
impl VoltageSource for MockSourceMeter {
    async fn set_voltage(&self, volts: f64) -> Result<()> {
        *self.output_volts.write().await = volts;
        if let CurrentModel::OhmicWithBreak { break_at_volts, .. } = *self.model.read().await {
            if volts >= break_at_volts {
                *self.broken.write().await = true;
            }
        }
        self.setpoints.lock().await.push(volts);
        tracing::trace!(volts, "MockSourceMeter: output set");
        Ok(())
    }
}

#[async_trait]
impl CurrentReader for MockSourceMeter {
    async fn read(&self) -> Result<(f64, f64)> {
        let model = *self.model.read().await;
        if let CurrentModel::Stuck { volts, amps } = model {
            return Ok((volts, amps));
        }
        let volts = *self.output_volts.read().await;
        let broken = *self.broken.read().await;
        let current = self.current_for(model, volts, broken)?;
        Ok((volts, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ohmic_model_obeys_ohms_law() {
        let meter = MockSourceMeter::new(CurrentModel::Ohmic { resistance: 200.0 });

        meter.set_voltage(1.0).await.unwrap();
        let (v, i) = meter.read().await.unwrap();
        assert_eq!(v, 1.0);
        assert!((i - 0.005).abs() < 1e-12);

        meter.set_voltage(0.0).await.unwrap();
        let (_, i) = meter.read().await.unwrap();
        assert_eq!(i, 0.0);
    }

    #[tokio::test]
    async fn break_model_jumps_at_threshold() {
        let meter = MockSourceMeter::new(CurrentModel::OhmicWithBreak {
            resistance: 100.0,
            break_at_volts: 0.5,
            broken_resistance: 1e6,
        });

        meter.set_voltage(0.4).await.unwrap();
        let (_, before) = meter.read().await.unwrap();
        assert!((before - 0.004).abs() < 1e-12);

        meter.set_voltage(0.5).await.unwrap();
        let (_, after) = meter.read().await.unwrap();
        assert!((after - 5e-7).abs() < 1e-12);

        // The break latches: back at low bias the junction stays broken.
        meter.set_voltage(0.4).await.unwrap();
        let (_, relaxed) = meter.read().await.unwrap();
        assert!((relaxed - 4e-7).abs() < 1e-12);
    }

    #[tokio::test]
    async fn negative_slope_model_droops() {
        let meter = MockSourceMeter::new(CurrentModel::NegativeSlope {
            baseline: 1e-3,
            droop: 1e-3,
        });

        meter.set_voltage(0.0).await.unwrap();
        let (_, i0) = meter.read().await.unwrap();
        meter.set_voltage(0.5).await.unwrap();
        let (_, i1) = meter.read().await.unwrap();
        assert!(i1 < i0);
    }

    #[tokio::test]
    async fn stuck_model_ignores_programmed_bias() {
        let meter = MockSourceMeter::new(CurrentModel::Ohmic { resistance: 100.0 });
        meter.set_voltage(0.1).await.unwrap();

        meter
            .set_model(CurrentModel::Stuck {
                volts: 0.02,
                amps: 2e-4,
            })
            .await;
        meter.set_voltage(0.3).await.unwrap();
        let (v, i) = meter.read().await.unwrap();
        assert_eq!(v, 0.02);
        assert_eq!(i, 2e-4);
    }

    #[tokio::test]
    async fn read_fault_fails_but_setpoints_succeed() {
        let meter = MockSourceMeter::new(CurrentModel::ReadFault);

        meter.set_voltage(0.3).await.unwrap();
        assert!(meter.read().await.is_err());

        meter.set_voltage(0.0).await.unwrap();
        assert_eq!(meter.setpoints().await, vec![0.3, 0.0]);
    }

    #[tokio::test]
    async fn noise_stays_within_bounds() {
        let meter =
            MockSourceMeter::new(CurrentModel::Ohmic { resistance: 100.0 }).with_noise(0.01);
        meter.set_voltage(1.0).await.unwrap();
        for _ in 0..50 {
            let (_, i) = meter.read().await.unwrap();
            assert!(i > 0.0098 && i < 0.0102, "reading {i} outside noise band");
        }
    }
}
