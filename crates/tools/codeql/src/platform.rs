//! Platform detection and archive selection.
//!
//! Maps the operating system name a node reports (e.g. "Linux",
//! "Windows Server 2019", "Mac OS X") to the CodeQL bundle built for it.

use std::fmt;

/// A platform-specific CodeQL archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformArchive {
    /// 64-bit Linux
    Linux64,
    /// 64-bit Windows
    Win64,
    /// 64-bit macOS
    Osx64,
}

impl PlatformArchive {
    /// Select the archive for a reported operating system name.
    ///
    /// The lower-cased name is matched against `linux`, `windows` and `mac`
    /// in that order; the first match wins. Unrecognized names yield `None`.
    #[must_use]
    pub fn select(os_name: &str) -> Option<Self> {
        let os = os_name.to_lowercase();
        if os.contains("linux") {
            Some(Self::Linux64)
        } else if os.contains("windows") {
            Some(Self::Win64)
        } else if os.contains("mac") {
            Some(Self::Osx64)
        } else {
            None
        }
    }

    /// Archive name suffix (e.g. "-linux64").
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Linux64 => "-linux64",
            Self::Win64 => "-win64",
            Self::Osx64 => "-osx64",
        }
    }

    /// Full archive file name (e.g. "codeql-linux64.zip").
    #[must_use]
    pub fn archive_name(self) -> String {
        format!("codeql{}.zip", self.suffix())
    }
}

impl fmt::Display for PlatformArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix().trim_start_matches('-'))
    }
}

/// Archive suffix for a reported operating system name; empty when the
/// platform is not recognized.
#[must_use]
pub fn archive_suffix(os_name: &str) -> &'static str {
    PlatformArchive::select(os_name).map_or("", PlatformArchive::suffix)
}
