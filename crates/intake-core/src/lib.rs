#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};

pub const CRATE_NAME: &str = "intake-core";

pub const ENV_INTAKE_LOG_LEVEL: &str = "INTAKE_LOG_LEVEL";
pub const ENV_INTAKE_DB_PATH: &str = "INTAKE_DB_PATH";

pub mod document;
pub mod path;

pub use document::{apply_patch, value_at, PatchError};
pub use path::{FieldPath, PathError};

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
