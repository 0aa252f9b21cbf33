//! Identifier generation.

use ulid::Ulid;

/// Produces globally unique, lexicographically time-sortable identifiers.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// 128-bit ULID: 48-bit millisecond timestamp + 80 random bits,
/// Crockford Base32, 26 chars.
#[derive(Debug, Clone, Copy, Default)]
pub struct UlidGenerator;

impl IdGenerator for UlidGenerator {
    fn generate(&self) -> String {
        Ulid::new().to_string()
    }
}
