use core::fmt;

/// Metadata of one flash partition, as reported by the partition table.
///
/// `H` is the platform handle used to hand the partition back to the
/// storage subsystem (a `*const esp_partition_t` on the device, a plain
/// index in tests). Two partitions are the same partition iff their
/// addresses match.
#[derive(Debug, Clone, Copy)]
pub struct PartitionInfo<H> {
    pub handle: H,
    pub label: &'static str,
    pub address: u32,
    pub size: u32,
    pub kind: u8,
    pub subtype: u8,
}

impl<H> PartitionInfo<H> {
    pub fn same_partition<O>(&self, other: &PartitionInfo<O>) -> bool {
        self.address == other.address
    }
}

impl<H> fmt::Display for PartitionInfo<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' type {} subtype {} at offset 0x{:08x} ({} KiB)",
            self.label,
            self.kind,
            self.subtype,
            self.address,
            self.size / 1024
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_offset_is_hex() {
        let p = PartitionInfo { handle: 0u8, label: "ota_0", address: 0x10000, size: 0x180000, kind: 0, subtype: 0x10 };
        assert_eq!(p.to_string(), "'ota_0' type 0 subtype 16 at offset 0x00010000 (1536 KiB)");
    }

    #[test]
    fn test_same_partition_by_address() {
        let a = PartitionInfo { handle: 1u8, label: "ota_0", address: 0x10000, size: 0x1000, kind: 0, subtype: 0x10 };
        let b = PartitionInfo { handle: 7u8, label: "ota_0", address: 0x10000, size: 0x1000, kind: 0, subtype: 0x10 };
        let c = PartitionInfo { handle: 1u8, label: "ota_1", address: 0x190000, size: 0x1000, kind: 0, subtype: 0x11 };
        assert!(a.same_partition(&b));
        assert!(!a.same_partition(&c));
    }
}
