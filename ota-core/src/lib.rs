//! Stepper OTA Core - Hardware-independent firmware update engine
//!
//! This crate contains the update logic for the stepper actuator firmware:
//! streaming header parsing, version decisions, the download state machine
//! and boot confirmation. Everything that touches the network, the flash or
//! the CPU reset line is reached through the traits in [`collab`], so the
//! whole engine can be tested on the host platform without ESP32 hardware.

pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod header;
pub mod image;
pub mod partition;
pub mod resolver;

pub use collab::{Connection, FinishError, FlashWriter, Platform, Storage, Transport};
pub use config::OtaConfig;
pub use engine::{OtaEngine, Outcome, Phase};
pub use error::OtaError;
pub use header::{HeaderAccumulator, Readiness, HEADER_BUFFER_CAPACITY};
pub use image::{AppDescriptor, AppVersion, ImageHeader, HEADER_MIN_SIZE};
pub use partition::PartitionInfo;
pub use resolver::{Intent, VersionResolver};
