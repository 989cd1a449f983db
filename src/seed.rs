use crate::experiment::{ProgramConfig, FIELD_SEPARATOR};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Deterministic 32-bit seed for one macro-replication of a program configuration.
///
/// The parameter initialiser is not part of the identity, so two configurations
/// that differ only in how they draw starting points share a seed lineage.
pub fn derive_seed(program: &ProgramConfig, replication: u32, global_seed: u64) -> u32 {
    let mut hasher = Sha256::new();

    // 1. Configuration identity
    hasher.update(program.canonical_identity().as_bytes());
    hasher.update(FIELD_SEPARATOR.as_bytes());

    // 2. Replication lineage
    hasher.update(replication.to_string().as_bytes());
    hasher.update(FIELD_SEPARATOR.as_bytes());
    hasher.update(global_seed.to_string().as_bytes());

    let digest = hasher.finalize();
    let seed = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    debug!(
        "seed for {} rep {} = {} ({})",
        program.name,
        replication,
        seed,
        hex::encode(&digest[..4])
    );
    seed
}
