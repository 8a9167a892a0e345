use serde::{Deserialize, Serialize};

use crate::dex::header::DexVersion;

/// Settings for reading and writing dex files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DexOptions {
    /// Version written into the magic of produced files.
    pub version: DexVersion,
    /// Recompute the Adler-32 checksum on read and reject mismatches.
    pub verify_checksum: bool,
    /// Recompute the SHA-1 signature on read and reject mismatches.
    pub verify_signature: bool,
}

impl Default for DexOptions {
    fn default() -> Self {
        DexOptions { version: DexVersion::V035, verify_checksum: true, verify_signature: false }
    }
}

impl DexOptions {
    pub fn with_version(mut self, version: DexVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    pub fn with_verify_signature(mut self, verify: bool) -> Self {
        self.verify_signature = verify;
        self
    }
}
