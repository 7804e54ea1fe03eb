/// Java-style string hash (`h = 31 * h + byte`) masked to 31 bits.
///
/// Used to pick object cache buckets.
pub fn string_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    for &byte in bytes {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    hash & 0x7FFF_FFFF
}

/// Robert Sedgewick's string hash.
///
/// Used to pick sharded lanes and snapshot index slots. Readers of a
/// published snapshot must hash with exactly this function.
pub fn rs_hash(bytes: &[u8]) -> u32 {
    const B: u32 = 378_551;
    let mut a: u32 = 63_689;
    let mut hash: u32 = 0;
    for &byte in bytes {
        hash = hash.wrapping_mul(a).wrapping_add(u32::from(byte));
        a = a.wrapping_mul(B);
    }
    hash
}
