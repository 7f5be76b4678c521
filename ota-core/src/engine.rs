//! Download state machine, finalization and boot confirmation.
//!
//! One `update()` call is one session:
//!
//! ```text
//! Connecting -> AccumulatingHeader -> { Writing | Skipped | Aborted }
//! Writing -> Finalizing -> { Rebooting | Aborted }
//! ```
//!
//! The flash writer lives inside `Stage::Writing`, so a write handle
//! exists only while writing or finalizing, and every error path that
//! leaves a `Writing` stage goes through `abandon`, which aborts it.

use core::time::Duration;

use sha2::{Digest, Sha256};

use crate::collab::{Connection, FinishError, FlashWriter, Platform, Storage, Transport};
use crate::config::OtaConfig;
use crate::error::OtaError;
use crate::header::{HeaderAccumulator, Readiness};
use crate::image::AppDescriptor;
use crate::resolver::{Intent, VersionResolver};

/// Bytes requested per network read.
pub const CHUNK_SIZE: usize = 1024;

/// Successful result of an update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The new image is sealed and set as boot partition. Through
    /// [`OtaEngine::update_and_restart`] the device resets and the caller
    /// never sees this value on hardware.
    Installed,
    /// The server offers the version that is already running.
    NoUpdateNeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    AccumulatingHeader,
    Writing,
    Skipped,
    Finalizing,
    Rebooting,
    Aborted,
}

enum Stage<W> {
    AccumulatingHeader,
    Writing(W),
}

/// Abort the write, if one is open, and pass the error through.
fn abandon<W: FlashWriter>(stage: Stage<W>, err: OtaError) -> OtaError {
    if let Stage::Writing(writer) = stage {
        log::warn!("Aborting write to update partition");
        writer.abort();
    }
    err
}

pub struct OtaEngine<T, S, P> {
    transport: T,
    storage: S,
    platform: P,
    config: OtaConfig,
    header: HeaderAccumulator,
    chunk: [u8; CHUNK_SIZE],
    phase: Phase,
}

impl<T, S, P> OtaEngine<T, S, P>
where
    T: Transport,
    S: Storage,
    P: Platform,
{
    pub fn new(transport: T, storage: S, platform: P, config: OtaConfig) -> Self {
        let config = config.validated();
        let header = HeaderAccumulator::new(config.header_ready_size());
        Self {
            transport,
            storage,
            platform,
            config,
            header,
            chunk: [0u8; CHUNK_SIZE],
            phase: Phase::Idle,
        }
    }

    /// Confirm the running image if it is still pending verification.
    ///
    /// Must run early on every boot: an unconfirmed image is rolled back by
    /// the bootloader on the next reset. Returns whether a confirmation was
    /// made.
    pub fn confirm_boot(&mut self) -> Result<bool, OtaError> {
        let running = self.storage.running_partition()?;
        match self.storage.is_pending_verify(&running) {
            Ok(true) => {
                log::info!("Running image {} is pending verification, marking it valid", running.label);
                self.storage.confirm_valid()?;
                log::info!("Rollback cancelled");
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                log::warn!("Could not read OTA state of {}: {}", running.label, e);
                Err(e)
            }
        }
    }

    /// Replace the tunables, e.g. once persisted settings are available.
    /// Takes effect from the next `update()`.
    pub fn set_config(&mut self, config: OtaConfig) {
        self.config = config.validated();
    }

    /// Fetch `url` and install it if it carries a new, not known-bad version.
    ///
    /// Never retries; retry policy belongs to the caller. Does not restart
    /// the device, see [`Self::update_and_restart`].
    pub fn update(&mut self, url: &str, timeout: Duration) -> Result<Outcome, OtaError> {
        log::info!("Starting OTA from {}", url);
        let result = self.run(url, timeout);
        match &result {
            Ok(Outcome::NoUpdateNeeded) => self.phase = Phase::Skipped,
            Ok(Outcome::Installed) => self.phase = Phase::Rebooting,
            Err(e) => {
                log::error!("OTA aborted ({}): {}", e.kind(), e);
                self.phase = Phase::Aborted;
            }
        }
        result
    }

    /// [`Self::update`], then reset the device if a new image was installed.
    pub fn update_and_restart(&mut self, url: &str, timeout: Duration) -> Result<Outcome, OtaError> {
        let outcome = self.update(url, timeout)?;
        if outcome == Outcome::Installed {
            log::info!("Prepare to restart system!");
            self.platform.restart();
        }
        Ok(outcome)
    }

    fn run(&mut self, url: &str, timeout: Duration) -> Result<Outcome, OtaError> {
        let Self { transport, storage, platform, config, header, chunk, phase } = self;

        *phase = Phase::Connecting;
        let resolver = VersionResolver::resolve(&*storage)?;

        let mut conn = transport.open(url, timeout)?;
        let content_length = conn.content_length();
        match content_length {
            Some(len) => log::info!("Content-Length: {}", len),
            None => log::info!("Content-Length: unknown"),
        }

        let candidate = storage.next_update_partition().ok_or(OtaError::NoUpdatePartition)?;
        log::info!("Writing to partition {}", candidate);

        *phase = Phase::AccumulatingHeader;
        header.reset(config.header_ready_size());
        let mut stage: Stage<S::Writer> = Stage::AccumulatingHeader;
        let mut written = 0usize;
        let mut zero_reads = 0u32;
        let mut digest = Sha256::new();
        let mut next_progress = config.progress_step_percent as u64;

        loop {
            let read = match conn.read(chunk) {
                Ok(n) => n,
                Err(e) => {
                    log::error!("Error: data read error");
                    return Err(abandon(stage, e));
                }
            };

            if read > 0 {
                zero_reads = 0;
                let data = &chunk[..read];

                match &mut stage {
                    Stage::AccumulatingHeader => {
                        match header.push(data)? {
                            Readiness::Pending { needed } => {
                                log::debug!(
                                    "Still accumulating header data (need {} more, currently at {})",
                                    needed,
                                    header.len()
                                );
                            }
                            Readiness::Ready => {
                                log::info!("Complete header accumulated ({} bytes)", header.len());
                                let desc = header
                                    .descriptor()
                                    .ok_or(OtaError::TruncatedTransfer { received: header.len() })?;
                                log_descriptor(&desc);

                                match resolver.intent(&desc.version) {
                                    Intent::Reject => {
                                        log::warn!("New version is the same as previously invalid version.");
                                        log::warn!("The firmware with version {} previously failed to boot.", desc.version);
                                        log::warn!("To prevent boot loop, we will not install this version.");
                                        return Err(OtaError::KnownBadVersion(desc.version));
                                    }
                                    Intent::Skip => {
                                        log::warn!("Current running version is the same as the new version.");
                                        log::info!("No update needed - already running {}", desc.version);
                                        return Ok(Outcome::NoUpdateNeeded);
                                    }
                                    Intent::Install => {
                                        let mut writer = storage.begin_write(&candidate)?;
                                        log::info!("Write to {} opened", candidate.label);
                                        if let Err(e) = writer.write(header.as_slice()) {
                                            log::error!("Flash write failed for accumulated data");
                                            return Err(abandon(Stage::Writing(writer), e));
                                        }
                                        digest.update(header.as_slice());
                                        written = header.len();
                                        log::info!("Wrote accumulated {} bytes to flash", written);
                                        stage = Stage::Writing(writer);
                                        *phase = Phase::Writing;
                                    }
                                }
                            }
                        }
                    }
                    Stage::Writing(writer) => {
                        if let Err(e) = writer.write(data) {
                            log::error!("Flash write failed at offset {}", written);
                            return Err(abandon(stage, e));
                        }
                        digest.update(data);
                        written += read;

                        if let Some(total) = content_length.filter(|&t| t > 0) {
                            let percent = written as u64 * 100 / total;
                            if percent >= next_progress {
                                log::info!("OTA progress: {}% ({}/{})", percent, written, total);
                                next_progress = percent + config.progress_step_percent as u64;
                            }
                        }
                    }
                }
                continue;
            }

            // A zero read: no data yet, clean close, or a dead link
            zero_reads += 1;
            log::debug!(
                "Zero read #{}, header_accumulated={}, writing={}",
                zero_reads,
                header.len(),
                matches!(stage, Stage::Writing(_))
            );

            match stage {
                Stage::AccumulatingHeader => {
                    if conn.is_transfer_complete() {
                        log::error!("Connection closed before accumulating enough header data!");
                        log::error!(
                            "Accumulated only {} bytes, need at least {}",
                            header.len(),
                            header.ready_size()
                        );
                        return Err(OtaError::TruncatedTransfer { received: header.len() });
                    } else if zero_reads >= config.max_zero_reads {
                        log::error!("Too many zero reads ({}) while accumulating header", zero_reads);
                        return Err(OtaError::StalledConnection { zero_reads });
                    }
                    log::debug!("Temporary zero read during header accumulation, waiting...");
                    platform.delay(config.header_poll_delay());
                }
                Stage::Writing(_) => {
                    if conn.is_connection_lost() {
                        log::error!("Connection closed after {} bytes", written);
                        return Err(abandon(stage, OtaError::TruncatedTransfer { received: written }));
                    } else if conn.is_transfer_complete() {
                        log::info!("Connection closed - transfer complete");
                        break;
                    } else if zero_reads >= config.max_zero_reads {
                        log::error!("Too many zero reads ({}) after header, connection may be dead", zero_reads);
                        return Err(abandon(stage, OtaError::StalledConnection { zero_reads }));
                    }
                    log::debug!("Temporary zero read, waiting for more data...");
                    platform.delay(config.body_poll_delay());
                }
            }
        }
        drop(conn);

        *phase = Phase::Finalizing;
        let writer = match stage {
            Stage::Writing(writer) => writer,
            Stage::AccumulatingHeader => return Err(OtaError::TruncatedTransfer { received: header.len() }),
        };

        log::info!("Total write binary data length: {}", written);
        log::info!("Image SHA-256: {}", hex(&digest.finalize()));

        match writer.end() {
            Ok(()) => {}
            Err(FinishError::ValidationFailed) => {
                log::error!("Image validation failed, image is corrupted");
                return Err(OtaError::ValidationFailed);
            }
            Err(FinishError::Other(code)) => {
                log::error!("Sealing the update partition failed (error {})", code);
                return Err(OtaError::WriteFailed { code });
            }
        }

        storage.set_boot_partition(&candidate)?;
        log::info!("Boot partition set to {}", candidate);
        Ok(Outcome::Installed)
    }

    /// Phase the last (or current) session ended in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }
}

fn log_descriptor(desc: &AppDescriptor) {
    log::info!("New firmware version: {}", desc.version);
    log::info!(
        "  project '{}', built {}, IDF {}",
        desc.project_name(),
        desc.build_stamp(),
        desc.idf_version()
    );
    if !desc.has_valid_magic() {
        // Storage validation rejects a bad image at the end; say so early.
        log::warn!("App descriptor magic is 0x{:08x}, image is probably not an app image", desc.magic_word);
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
