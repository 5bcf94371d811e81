//! Deterministic signature hashing for singleton process detection.
//!
//! A signature is a hash over `role|command|cwd|args` (spec data model).
//! It deliberately excludes `env`: two singleton starts with the same
//! role/command/cwd/args but different environments are considered the
//! same logical process (open question in spec.md §9, resolved in
//! DESIGN.md in favor of the signature-fields-only reading).

use sha2::{Digest, Sha256};

use crate::process::Role;

/// Compute the signature for a process's identity fields.
pub fn signature_of(role: &Role, command: &str, cwd: &str, args: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(role.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(command.as_bytes());
    hasher.update(b"|");
    hasher.update(cwd.as_bytes());
    for arg in args {
        hasher.update(b"|");
        hasher.update(arg.as_bytes());
    }
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
