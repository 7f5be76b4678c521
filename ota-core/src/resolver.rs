/// Running / boot / last-invalid partition facts and the version checks
/// made against them.
use crate::collab::Storage;
use crate::error::OtaError;
use crate::image::AppVersion;

/// What to do with an incoming image, decided from its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Version previously failed to boot.
    Reject,
    /// Already running this version.
    Skip,
    Install,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionResolver {
    running: Option<AppVersion>,
    last_invalid: Option<AppVersion>,
    boot_matches_running: bool,
}

impl VersionResolver {
    pub fn new(running: Option<AppVersion>, last_invalid: Option<AppVersion>) -> Self {
        Self { running, last_invalid, boot_matches_running: true }
    }

    /// Query the storage subsystem once and log what it reports.
    ///
    /// A boot partition that differs from the running one is only a
    /// warning: it can follow a corrupted otadata sector. A running version
    /// that can't be read is logged and then never matches anything.
    pub fn resolve<S: Storage>(storage: &S) -> Result<Self, OtaError> {
        let running = storage.running_partition()?;

        let boot_matches_running = match storage.boot_partition() {
            Some(boot) if !boot.same_partition(&running) => {
                log::warn!(
                    "Configured OTA boot partition at offset 0x{:08x}, but running from offset 0x{:08x}",
                    boot.address,
                    running.address
                );
                log::warn!("(This can happen if either the OTA boot data or preferred boot image become corrupted somehow.)");
                false
            }
            Some(_) => true,
            None => {
                log::warn!("No configured OTA boot partition");
                false
            }
        };
        log::info!("Running partition {}", running);

        let running_version = match storage.app_version_of(&running) {
            Ok(version) => {
                log::info!("Running firmware version: {}", version);
                Some(version)
            }
            Err(e) => {
                log::warn!("Could not read running firmware version: {}", e);
                None
            }
        };

        let last_invalid = storage.last_invalid_partition().and_then(|partition| {
            match storage.app_version_of(&partition) {
                Ok(version) => {
                    log::info!("Last invalid firmware version: {} ({})", version, partition.label);
                    Some(version)
                }
                Err(e) => {
                    log::warn!("Last invalid partition {} has no readable version: {}", partition.label, e);
                    None
                }
            }
        });

        Ok(Self { running: running_version, last_invalid, boot_matches_running })
    }

    pub fn is_same_as_running(&self, candidate: &AppVersion) -> bool {
        self.running.as_ref() == Some(candidate)
    }

    pub fn is_known_bad(&self, candidate: &AppVersion) -> bool {
        self.last_invalid.as_ref() == Some(candidate)
    }

    /// Known-bad is checked before same-as-running.
    pub fn intent(&self, candidate: &AppVersion) -> Intent {
        if self.is_known_bad(candidate) {
            Intent::Reject
        } else if self.is_same_as_running(candidate) {
            Intent::Skip
        } else {
            Intent::Install
        }
    }

    /// False when the configured boot partition is missing or is not the
    /// one executing.
    pub fn boot_matches_running(&self) -> bool {
        self.boot_matches_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{FinishError, FlashWriter};
    use crate::partition::PartitionInfo;

    struct NoWriter;

    impl FlashWriter for NoWriter {
        fn write(&mut self, _data: &[u8]) -> Result<(), OtaError> {
            Ok(())
        }

        fn end(self) -> Result<(), FinishError> {
            Ok(())
        }

        fn abort(self) {}
    }

    /// Partition table with `ota_0` running; versions keyed by address.
    struct Table {
        boot: Option<PartitionInfo<()>>,
        last_invalid: Option<PartitionInfo<()>>,
        versions: Vec<(u32, AppVersion)>,
    }

    fn part(label: &'static str, address: u32) -> PartitionInfo<()> {
        PartitionInfo { handle: (), label, address, size: 0x100000, kind: 0, subtype: 0x10 }
    }

    impl Table {
        fn new(running_version: &str) -> Self {
            Self {
                boot: Some(part("ota_0", 0x10000)),
                last_invalid: None,
                versions: vec![(0x10000, v(running_version))],
            }
        }
    }

    impl Storage for Table {
        type Handle = ();
        type Writer = NoWriter;

        fn running_partition(&self) -> Result<PartitionInfo<()>, OtaError> {
            Ok(part("ota_0", 0x10000))
        }

        fn boot_partition(&self) -> Option<PartitionInfo<()>> {
            self.boot
        }

        fn next_update_partition(&self) -> Option<PartitionInfo<()>> {
            Some(part("ota_1", 0x110000))
        }

        fn last_invalid_partition(&self) -> Option<PartitionInfo<()>> {
            self.last_invalid
        }

        fn app_version_of(&self, partition: &PartitionInfo<()>) -> Result<AppVersion, OtaError> {
            self.versions
                .iter()
                .find(|(address, _)| *address == partition.address)
                .map(|(_, version)| *version)
                .ok_or(OtaError::Storage { code: -1 })
        }

        fn begin_write(&mut self, _partition: &PartitionInfo<()>) -> Result<NoWriter, OtaError> {
            Ok(NoWriter)
        }

        fn set_boot_partition(&mut self, _partition: &PartitionInfo<()>) -> Result<(), OtaError> {
            Ok(())
        }

        fn is_pending_verify(&self, _partition: &PartitionInfo<()>) -> Result<bool, OtaError> {
            Ok(false)
        }

        fn confirm_valid(&mut self) -> Result<(), OtaError> {
            Ok(())
        }
    }

    #[test]
    fn test_resolve_consistent_table() {
        let resolver = VersionResolver::resolve(&Table::new("1.0")).unwrap();
        assert!(resolver.boot_matches_running());
        assert_eq!(resolver.intent(&v("1.0")), Intent::Skip);
        assert_eq!(resolver.intent(&v("1.1")), Intent::Install);
    }

    #[test]
    fn test_resolve_boot_elsewhere_is_reported_not_fatal() {
        let mut table = Table::new("1.0");
        table.boot = Some(part("ota_1", 0x110000));

        let resolver = VersionResolver::resolve(&table).unwrap();
        assert!(!resolver.boot_matches_running());
        assert_eq!(resolver.intent(&v("1.0")), Intent::Skip);
        assert_eq!(resolver.intent(&v("1.1")), Intent::Install);
    }

    #[test]
    fn test_resolve_without_boot_partition() {
        let mut table = Table::new("1.0");
        table.boot = None;

        let resolver = VersionResolver::resolve(&table).unwrap();
        assert!(!resolver.boot_matches_running());
        assert_eq!(resolver.intent(&v("1.0")), Intent::Skip);
    }

    #[test]
    fn test_resolve_reads_last_invalid_version() {
        let mut table = Table::new("1.0");
        table.last_invalid = Some(part("ota_1", 0x110000));
        table.versions.push((0x110000, v("1.1")));

        let resolver = VersionResolver::resolve(&table).unwrap();
        assert!(resolver.is_known_bad(&v("1.1")));
        assert_eq!(resolver.intent(&v("1.1")), Intent::Reject);
        assert_eq!(resolver.intent(&v("1.2")), Intent::Install);
    }

    fn v(s: &str) -> AppVersion {
        AppVersion::from_str_lossy(s)
    }

    #[test]
    fn test_intent_order() {
        let resolver = VersionResolver::new(Some(v("1.0")), Some(v("1.1")));
        assert_eq!(resolver.intent(&v("1.1")), Intent::Reject);
        assert_eq!(resolver.intent(&v("1.0")), Intent::Skip);
        assert_eq!(resolver.intent(&v("1.2")), Intent::Install);
    }

    #[test]
    fn test_known_bad_wins_over_running() {
        // Running an image whose version is also recorded as invalid: the
        // rejection still applies.
        let resolver = VersionResolver::new(Some(v("1.0")), Some(v("1.0")));
        assert!(resolver.is_same_as_running(&v("1.0")));
        assert_eq!(resolver.intent(&v("1.0")), Intent::Reject);
    }

    #[test]
    fn test_unknown_running_version_never_matches() {
        let resolver = VersionResolver::new(None, None);
        assert!(!resolver.is_same_as_running(&v("")));
        assert!(!resolver.is_known_bad(&v("")));
        assert_eq!(resolver.intent(&v("anything")), Intent::Install);
    }
}
