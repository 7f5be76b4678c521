use core::fmt;

use crate::image::AppVersion;

/// Why an update attempt failed.
///
/// `code` fields carry the platform error number (an `esp_err_t` on the
/// device) so it can be logged; they take no part in equality decisions
/// made by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtaError {
    /// The connection to the firmware server could not be opened.
    ConnectFailed { code: i32 },
    /// A read returned an error (negative length), e.g. a TLS failure.
    TransportError { code: i32 },
    /// The header did not fit the accumulation buffer before it was ready.
    HeaderTooLarge { accumulated: usize, incoming: usize, capacity: usize },
    /// The server finished (or dropped) before the image was fully received.
    TruncatedTransfer { received: usize },
    /// Too many consecutive zero-length reads.
    StalledConnection { zero_reads: u32 },
    /// The image carries the version that last failed to boot.
    KnownBadVersion(AppVersion),
    /// Opening or writing the candidate partition failed.
    WriteFailed { code: i32 },
    /// The written image did not pass the storage subsystem's validation.
    ValidationFailed,
    /// The candidate could not be made the boot partition.
    BootSwitchFailed { code: i32 },
    /// There is no inactive partition to write into.
    NoUpdatePartition,
    /// A read-only partition query failed.
    Storage { code: i32 },
}

impl OtaError {
    /// Short machine-friendly name, used in log lines and by the host tool.
    pub fn kind(&self) -> &'static str {
        match self {
            OtaError::ConnectFailed { .. } => "connect_failed",
            OtaError::TransportError { .. } => "transport_error",
            OtaError::HeaderTooLarge { .. } => "header_too_large",
            OtaError::TruncatedTransfer { .. } => "truncated_transfer",
            OtaError::StalledConnection { .. } => "stalled_connection",
            OtaError::KnownBadVersion(_) => "known_bad_version",
            OtaError::WriteFailed { .. } => "write_failed",
            OtaError::ValidationFailed => "validation_failed",
            OtaError::BootSwitchFailed { .. } => "boot_switch_failed",
            OtaError::NoUpdatePartition => "no_update_partition",
            OtaError::Storage { .. } => "storage",
        }
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaError::ConnectFailed { code } => {
                write!(f, "failed to open connection to firmware server (error {})", code)
            }
            OtaError::TransportError { code } => write!(f, "transport read error (error {})", code),
            OtaError::HeaderTooLarge { accumulated, incoming, capacity } => write!(
                f,
                "header buffer overflow: {} accumulated + {} incoming > {} capacity",
                accumulated, incoming, capacity
            ),
            OtaError::TruncatedTransfer { received } => {
                write!(f, "transfer ended early after {} bytes", received)
            }
            OtaError::StalledConnection { zero_reads } => {
                write!(f, "connection stalled after {} consecutive zero reads", zero_reads)
            }
            OtaError::KnownBadVersion(version) => {
                write!(f, "version {} previously failed to boot", version)
            }
            OtaError::WriteFailed { code } => write!(f, "flash write failed (error {})", code),
            OtaError::ValidationFailed => write!(f, "image validation failed, image is corrupted"),
            OtaError::BootSwitchFailed { code } => {
                write!(f, "failed to set boot partition (error {})", code)
            }
            OtaError::NoUpdatePartition => write!(f, "no update partition available"),
            OtaError::Storage { code } => write!(f, "partition query failed (error {})", code),
        }
    }
}

impl std::error::Error for OtaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_counts() {
        let err = OtaError::HeaderTooLarge { accumulated: 8000, incoming: 1024, capacity: 8192 };
        let msg = err.to_string();
        assert!(msg.contains("8000"));
        assert!(msg.contains("8192"));
    }

    #[test]
    fn test_known_bad_display_trims_version() {
        let err = OtaError::KnownBadVersion(AppVersion::from_str_lossy("1.2.3"));
        assert_eq!(err.to_string(), "version 1.2.3 previously failed to boot");
        assert_eq!(err.kind(), "known_bad_version");
    }
}
