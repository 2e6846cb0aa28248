//! Core types shared by the SIF crates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target architecture recorded in the header and in partition metadata
///
/// Stored on disk as two ASCII digits followed by a NUL byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[default]
    Unknown,
    X386,
    Amd64,
    Arm,
    Arm64,
    Ppc64,
    Ppc64le,
    Mips,
    Mipsle,
    Mips64,
    Mips64le,
    S390x,
}

impl Arch {
    /// Size of the on-disk architecture field
    pub const CODE_LEN: usize = 3;

    const ALL: [Arch; 12] = [
        Arch::Unknown,
        Arch::X386,
        Arch::Amd64,
        Arch::Arm,
        Arch::Arm64,
        Arch::Ppc64,
        Arch::Ppc64le,
        Arch::Mips,
        Arch::Mipsle,
        Arch::Mips64,
        Arch::Mips64le,
        Arch::S390x,
    ];

    /// On-disk code for this architecture
    pub fn code(&self) -> [u8; Self::CODE_LEN] {
        let digits: &[u8; 2] = match self {
            Arch::Unknown => b"00",
            Arch::X386 => b"01",
            Arch::Amd64 => b"02",
            Arch::Arm => b"03",
            Arch::Arm64 => b"04",
            Arch::Ppc64 => b"05",
            Arch::Ppc64le => b"06",
            Arch::Mips => b"07",
            Arch::Mipsle => b"08",
            Arch::Mips64 => b"09",
            Arch::Mips64le => b"10",
            Arch::S390x => b"11",
        };
        [digits[0], digits[1], 0]
    }

    /// Parse an on-disk code; only the two digits are significant
    pub fn from_code(bytes: &[u8]) -> Option<Self> {
        let digits = bytes.get(..2)?;
        Self::ALL.into_iter().find(|arch| &arch.code()[..2] == digits)
    }

    /// Go-style architecture name
    pub fn name(&self) -> &'static str {
        match self {
            Arch::Unknown => "unknown",
            Arch::X386 => "386",
            Arch::Amd64 => "amd64",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Ppc64 => "ppc64",
            Arch::Ppc64le => "ppc64le",
            Arch::Mips => "mips",
            Arch::Mipsle => "mipsle",
            Arch::Mips64 => "mips64",
            Arch::Mips64le => "mips64le",
            Arch::S390x => "s390x",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Arch {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        let s = match s.as_str() {
            "i386" | "x86" => "386",
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|arch| arch.name() == s)
            .ok_or_else(|| crate::Error::invalid_input(format!("Unknown architecture: {}", s)))
    }
}

/// Format size in human-readable format
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_codes() {
        assert_eq!(&Arch::Amd64.code(), b"02\0");
        assert_eq!(&Arch::S390x.code(), b"11\0");
        assert_eq!(Arch::from_code(b"04\0"), Some(Arch::Arm64));
        assert_eq!(Arch::from_code(b"10"), Some(Arch::Mips64le));
        assert_eq!(Arch::from_code(b"99\0"), None);
        assert_eq!(Arch::from_code(b"0"), None);
    }

    #[test]
    fn test_arch_from_str() {
        assert_eq!("amd64".parse::<Arch>().unwrap(), Arch::Amd64);
        assert_eq!("x86_64".parse::<Arch>().unwrap(), Arch::Amd64);
        assert_eq!("386".parse::<Arch>().unwrap(), Arch::X386);
        assert!("vax".parse::<Arch>().is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(1536 * 1024), "1.50 MB");
    }
}
