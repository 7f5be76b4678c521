/// ESP-IDF application image layout.
///
/// An app image starts with a 24-byte image header, followed by the first
/// segment header (8 bytes) whose payload begins with the 256-byte
/// application descriptor. Only fixed offsets are used here; nothing is
/// ever read past the end of the slice handed in.
use core::fmt;

/// `sizeof(esp_image_header_t)`
pub const IMAGE_HEADER_SIZE: usize = 24;
/// `sizeof(esp_image_segment_header_t)`
pub const SEGMENT_HEADER_SIZE: usize = 8;
/// `sizeof(esp_app_desc_t)`
pub const APP_DESC_SIZE: usize = 256;

/// Smallest prefix of an image that contains the whole app descriptor.
pub const HEADER_MIN_SIZE: usize = IMAGE_HEADER_SIZE + SEGMENT_HEADER_SIZE + APP_DESC_SIZE;

/// Offset of the app descriptor from the start of the image.
pub const APP_DESC_OFFSET: usize = IMAGE_HEADER_SIZE + SEGMENT_HEADER_SIZE;

pub const IMAGE_MAGIC: u8 = 0xE9;
pub const APP_DESC_MAGIC: u32 = 0xABCD_5432;

pub const VERSION_LEN: usize = 32;

/// Version string from an app descriptor, compared byte for byte.
///
/// This is never parsed as a semantic version: "1.0" and "1.0.0" are
/// different versions, and so are two strings that differ only in the
/// padding after the terminating NUL.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppVersion([u8; VERSION_LEN]);

impl AppVersion {
    pub const fn from_bytes(bytes: [u8; VERSION_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a NUL-padded version from text, truncated to 31 bytes so the
    /// field stays NUL-terminated like the C struct.
    pub fn from_str_lossy(text: &str) -> Self {
        let mut bytes = [0u8; VERSION_LEN];
        let len = text.len().min(VERSION_LEN - 1);
        bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VERSION_LEN] {
        &self.0
    }

    /// Printable part, up to the first NUL.
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(trim_nul(&self.0))
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str_lossy())
    }
}

impl fmt::Debug for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppVersion({:?})", self.as_str_lossy())
    }
}

/// Fields of `esp_image_header_t` worth logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub magic: u8,
    pub segment_count: u8,
    pub entry_addr: u32,
    pub chip_id: u16,
}

impl ImageHeader {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < IMAGE_HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: bytes[0],
            segment_count: bytes[1],
            entry_addr: read_u32(bytes, 4),
            chip_id: u16::from_le_bytes([bytes[12], bytes[13]]),
        })
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == IMAGE_MAGIC
    }
}

/// Parsed `esp_app_desc_t`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    pub magic_word: u32,
    pub secure_version: u32,
    pub version: AppVersion,
    pub project_name: [u8; 32],
    pub time: [u8; 16],
    pub date: [u8; 16],
    pub idf_ver: [u8; 32],
    pub app_elf_sha256: [u8; 32],
}

impl AppDescriptor {
    /// Parse a descriptor from exactly the descriptor bytes (at least
    /// [`APP_DESC_SIZE`] of them).
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < APP_DESC_SIZE {
            return None;
        }
        let mut version = [0u8; VERSION_LEN];
        version.copy_from_slice(&bytes[16..48]);
        Some(Self {
            magic_word: read_u32(bytes, 0),
            secure_version: read_u32(bytes, 4),
            version: AppVersion::from_bytes(version),
            project_name: copy_array(&bytes[48..80]),
            time: copy_array(&bytes[80..96]),
            date: copy_array(&bytes[96..112]),
            idf_ver: copy_array(&bytes[112..144]),
            app_elf_sha256: copy_array(&bytes[144..176]),
        })
    }

    /// Parse the descriptor embedded in the first bytes of an image.
    pub fn from_image_prefix(image: &[u8]) -> Option<Self> {
        image.get(APP_DESC_OFFSET..).and_then(Self::parse)
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic_word == APP_DESC_MAGIC
    }

    pub fn project_name(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(trim_nul(&self.project_name))
    }

    /// Compile date and time, e.g. "Jan  1 2026 12:00:00".
    pub fn build_stamp(&self) -> String {
        format!(
            "{} {}",
            String::from_utf8_lossy(trim_nul(&self.date)),
            String::from_utf8_lossy(trim_nul(&self.time))
        )
    }

    pub fn idf_version(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(trim_nul(&self.idf_ver))
    }
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn copy_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a plausible image of `total_len` bytes carrying `version`.
    pub(crate) fn sample_image(version: &str, total_len: usize) -> Vec<u8> {
        let mut image = vec![0u8; total_len.max(HEADER_MIN_SIZE)];
        image[0] = IMAGE_MAGIC;
        image[1] = 3;
        image[4..8].copy_from_slice(&0x4037_5000u32.to_le_bytes());
        let desc = APP_DESC_OFFSET;
        image[desc..desc + 4].copy_from_slice(&APP_DESC_MAGIC.to_le_bytes());
        let v = AppVersion::from_str_lossy(version);
        image[desc + 16..desc + 48].copy_from_slice(v.as_bytes());
        image[desc + 48..desc + 55].copy_from_slice(b"stepper");
        image[desc + 80..desc + 88].copy_from_slice(b"12:00:00");
        image[desc + 96..desc + 107].copy_from_slice(b"Jan  1 2026");
        image[desc + 112..desc + 118].copy_from_slice(b"v5.3.1");
        // Body bytes after the header, so truncation bugs show up as mismatches
        for (i, byte) in image.iter_mut().enumerate().skip(HEADER_MIN_SIZE) {
            *byte = (i % 251) as u8;
        }
        image.truncate(total_len);
        image
    }

    #[test]
    fn test_header_min_size() {
        assert_eq!(HEADER_MIN_SIZE, 288);
        assert_eq!(APP_DESC_OFFSET, 32);
    }

    #[test]
    fn test_parse_descriptor_from_image() {
        let image = sample_image("stepper-1.4.0", 4096);
        let desc = AppDescriptor::from_image_prefix(&image).unwrap();
        assert!(desc.has_valid_magic());
        assert_eq!(desc.version, AppVersion::from_str_lossy("stepper-1.4.0"));
        assert_eq!(desc.project_name(), "stepper");
        assert_eq!(desc.build_stamp(), "Jan  1 2026 12:00:00");
        assert_eq!(desc.idf_version(), "v5.3.1");

        let header = ImageHeader::parse(&image).unwrap();
        assert!(header.has_valid_magic());
        assert_eq!(header.segment_count, 3);
    }

    #[test]
    fn test_short_prefix_does_not_parse() {
        let image = sample_image("1.0", HEADER_MIN_SIZE);
        assert!(AppDescriptor::from_image_prefix(&image).is_some());
        assert!(AppDescriptor::from_image_prefix(&image[..HEADER_MIN_SIZE - 1]).is_none());
        assert!(ImageHeader::parse(&image[..10]).is_none());
    }

    #[test]
    fn test_version_equality_is_bytewise() {
        assert_ne!(AppVersion::from_str_lossy("1.0"), AppVersion::from_str_lossy("1.0.0"));

        let mut padded = *AppVersion::from_str_lossy("1.0").as_bytes();
        padded[20] = b'x';
        let padded = AppVersion::from_bytes(padded);
        assert_eq!(padded.to_string(), "1.0");
        assert_ne!(padded, AppVersion::from_str_lossy("1.0"));
    }

    #[test]
    fn test_version_truncated_to_fit_terminator() {
        let long = "0123456789012345678901234567890123456789";
        let v = AppVersion::from_str_lossy(long);
        assert_eq!(v.as_bytes()[31], 0);
        assert_eq!(v.to_string().len(), 31);
    }
}
