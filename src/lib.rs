//! # break-daq Core Library
//!
//! Headless control software for break-junction electromigration
//! experiments. A session alternates low-voltage resistance probes with
//! voltage ramps that thin a metallic constriction until its resistance
//! jumps, logging every resistance estimate to CSV along the way.
//!
//! ## Crate Structure
//!
//! - **`config`**: figment-based typed configuration (TOML + environment
//!   overrides) for the application, storage, instrument, and controller
//!   parameters.
//! - **`data`**: least-squares I-V fitting (`data::fit`) and measurement
//!   record sinks (`data::storage`).
//! - **`error`**: the `DaqError` enum for infrastructure errors.
//! - **`hardware`**: capability traits (`VoltageSource`, `CurrentReader`)
//!   and the simulated source-meter used for headless operation and tests.
//! - **`procedures`**: the break-junction controller, session outcomes, and
//!   the cooperative abort flag.

pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod procedures;
