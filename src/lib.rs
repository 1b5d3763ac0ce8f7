//! # Rusty ICT
//!
//! Core of a universal IC tester: a controller drives a 20- or 40-pin ZIF
//! socket through uncommitted GPIO lines and uses them to identify and test
//! logic, DRAM, SRAM, ROM, FRAM and Flash parts without rewiring.
//!
//! This library provides:
//! - Socket wiring with package centering ([`socket`]) over a [`GpioPort`]
//! - Named multi-bit buses resolved from data-only chip profiles ([`bus`], [`profile`])
//! - A compiled-in catalogue with part-code identification ([`database`])
//! - A cycle state machine with DRAM refresh scheduling ([`sequencer`])
//! - Verdict classification over one or two passes ([`classifier`])
//! - Cooperative runs with cancellation and media procedures ([`run`])
//! - A simulated bench with device models and fault injection ([`components`])

pub mod bus;
pub mod classifier;
pub mod component;
pub mod components;
pub mod config;
pub mod database;
pub mod error;
pub mod media;
pub mod pin;
pub mod profile;
pub mod run;
pub mod sequencer;
pub mod socket;
pub mod timing;

// Re-export commonly used items for easier importing
pub use classifier::{ResultClassifier, TestOutcome, Verdict, VectorMismatch};
pub use component::{Component, Fault};
pub use components::{Bench, DeviceFactory};
pub use config::TesterConfig;
pub use database::{ChipDatabase, FamilyId, Identification};
pub use error::{Result, TesterError};
pub use media::{ByteStream, MemoryStream, StreamMode};
pub use pin::{GpioPort, PinMode, PinValue};
pub use profile::{ChipKind, ChipProfile, ChipType};
pub use run::{IcRecord, Progress, RunHandle, Tester};
pub use sequencer::{TestPattern, TestSequencer};
pub use socket::{SocketMap, ZifGeneration};
pub use timing::{Timebase, VirtualClock};
