use rex_core::derive_substream_seed;

/// Derives the seed used to draw the initial state of the replica in `slot`.
pub fn init_seed(master_seed: u64, slot: usize) -> u64 {
    derive_substream_seed(master_seed, slot as u64)
}

/// Derives the seed for one propagation call of the replica in `slot`.
///
/// Keyed by slot and round so the result does not depend on which worker
/// thread executes the call or in which order.
pub fn propagate_seed(master_seed: u64, slot: usize, round: usize) -> u64 {
    let intermediate = derive_substream_seed(
        master_seed ^ 0x5EED_F00D_9A0A_5A7E,
        (slot as u64) << 32 | round as u64,
    );
    derive_substream_seed(intermediate, 0)
}

/// Seed of the single stream shared by every swap draw and pair choice.
pub fn swap_seed(master_seed: u64) -> u64 {
    derive_substream_seed(master_seed ^ 0xA5A5_A5A5_A5A5_A5A5, u64::MAX)
}
