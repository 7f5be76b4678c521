//! Interfaces to the things the update engine drives but does not own:
//! the network transport, the OTA flash storage and the platform itself.

use core::time::Duration;

use crate::error::OtaError;
use crate::image::AppVersion;
use crate::partition::PartitionInfo;

/// Opens firmware downloads.
pub trait Transport {
    type Connection: Connection;

    /// Open `url` and fetch the response headers. `timeout` is handed to
    /// the underlying client for connect and per-read timeouts.
    fn open(&mut self, url: &str, timeout: Duration) -> Result<Self::Connection, OtaError>;
}

/// One open download. Closed when dropped.
pub trait Connection {
    /// Read up to `buf.len()` bytes. `Ok(0)` is ambiguous: no data yet, a
    /// clean close, or a dead link. Use the two queries below to tell them
    /// apart. An `Err` is a transport failure and is always fatal.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, OtaError>;

    /// Whether the server has delivered everything it announced.
    fn is_transfer_complete(&self) -> bool;

    /// Whether the socket was reset or is no longer connected.
    fn is_connection_lost(&self) -> bool;

    /// Announced body length, if the server sent one.
    fn content_length(&self) -> Option<u64> {
        None
    }
}

/// Why sealing a written image failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishError {
    /// The image is malformed or corrupted.
    ValidationFailed,
    /// Any other storage failure.
    Other(i32),
}

/// An open write into a candidate partition.
///
/// `end` and `abort` consume the writer, so a sealed or abandoned write
/// can't be written to again.
pub trait FlashWriter {
    fn write(&mut self, data: &[u8]) -> Result<(), OtaError>;

    /// Seal the image. Validation happens here.
    fn end(self) -> Result<(), FinishError>;

    /// Release the write and leave the partition overwritable.
    fn abort(self);
}

/// The OTA partition subsystem.
pub trait Storage {
    type Handle: Copy;
    type Writer: FlashWriter;

    fn running_partition(&self) -> Result<PartitionInfo<Self::Handle>, OtaError>;
    fn boot_partition(&self) -> Option<PartitionInfo<Self::Handle>>;
    fn next_update_partition(&self) -> Option<PartitionInfo<Self::Handle>>;
    fn last_invalid_partition(&self) -> Option<PartitionInfo<Self::Handle>>;

    fn app_version_of(&self, partition: &PartitionInfo<Self::Handle>) -> Result<AppVersion, OtaError>;

    fn begin_write(&mut self, partition: &PartitionInfo<Self::Handle>) -> Result<Self::Writer, OtaError>;
    fn set_boot_partition(&mut self, partition: &PartitionInfo<Self::Handle>) -> Result<(), OtaError>;

    /// Whether `partition` was just switched to and still awaits confirmation.
    /// `Ok(false)` for an image with no OTA state at all, such as a factory app.
    fn is_pending_verify(&self, partition: &PartitionInfo<Self::Handle>) -> Result<bool, OtaError>;

    /// Mark the running image valid and cancel the pending rollback.
    fn confirm_valid(&mut self) -> Result<(), OtaError>;
}

/// Blocking platform services.
pub trait Platform {
    fn delay(&mut self, duration: Duration);

    /// Reset the device. On hardware this never returns.
    fn restart(&mut self);
}
