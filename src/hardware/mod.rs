//! Atomic Hardware Capabilities
//!
//! Fine-grained capability traits for the instruments a break-junction
//! session touches. Instead of a monolithic `SourceMeter` driver interface,
//! devices implement the specific capabilities they support:
//!
//! - A Keithley-class source-meter implements `VoltageSource + CurrentReader`
//! - A DAQ analog-out channel implements only `VoltageSource`
//! - A DAQ analog-in pair implements only `CurrentReader`
//!
//! Each capability trait is async (`#[async_trait]`), thread-safe
//! (`Send + Sync`), uses `anyhow::Result` for errors, and focuses on one
//! thing. The controller is the sole owner of its devices for the duration
//! of a session; no concurrent access is expected.

pub mod mock;

use anyhow::Result;
use async_trait::async_trait;

/// Capability: Bias Voltage Output
///
/// Devices that can hold a DC output voltage (source-meters, DAQ analog
/// outputs).
///
/// # Contract
/// - Voltages are in volts.
/// - `set_voltage(0.0)` is the safe/idle state and must always be accepted,
///   including repeatedly and after any other setpoint.
/// - The call blocks until the setpoint has been written to the device;
///   settling is the caller's concern.
#[async_trait]
pub trait VoltageSource: Send + Sync {
    /// Drive the output to `volts`.
    async fn set_voltage(&self, volts: f64) -> Result<()>;
}

/// Capability: Simultaneous V/I Readback
///
/// Devices that measure the present bias voltage together with the current
/// it produces (source-meter sense lines, a DAQ analog-input pair).
///
/// # Contract
/// - Returns `(voltage_volts, current_amperes)` sampled together, so the
///   pair is consistent for resistance arithmetic.
/// - A read reflects the output most recently set on the companion
///   [`VoltageSource`], after settling.
#[async_trait]
pub trait CurrentReader: Send + Sync {
    /// Read the present (voltage, current) operating point.
    async fn read(&self) -> Result<(f64, f64)>;
}

/// Combined trait for devices that both source voltage and read current.
///
/// Exists solely to enable trait objects; implement the individual traits
/// and get this automatically via the blanket impl.
pub trait SourceMeter: VoltageSource + CurrentReader {}

impl<T: VoltageSource + CurrentReader> SourceMeter for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedResistor {
        resistance: f64,
        output: Mutex<f64>,
    }

    #[async_trait]
    impl VoltageSource for FixedResistor {
        async fn set_voltage(&self, volts: f64) -> Result<()> {
            *self.output.lock().unwrap() = volts;
            Ok(())
        }
    }

    #[async_trait]
    impl CurrentReader for FixedResistor {
        async fn read(&self) -> Result<(f64, f64)> {
            let v = *self.output.lock().unwrap();
            Ok((v, v / self.resistance))
        }
    }

    #[tokio::test]
    async fn blanket_source_meter_impl() {
        let dev = FixedResistor {
            resistance: 100.0,
            output: Mutex::new(0.0),
        };
        let meter: &dyn SourceMeter = &dev;

        meter.set_voltage(1.0).await.unwrap();
        let (v, i) = meter.read().await.unwrap();
        assert_eq!(v, 1.0);
        assert!((i - 0.01).abs() < 1e-12);

        // Zero is always accepted as the idle state.
        meter.set_voltage(0.0).await.unwrap();
        let (v, _) = meter.read().await.unwrap();
        assert_eq!(v, 0.0);
    }
}
