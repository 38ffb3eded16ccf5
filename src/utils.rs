//! Utility functions for wallet identities and fingerprints

use bech32::Bech32m;
use uuid7::uuid7;

// mint a fresh wallet address then encode using bech32
pub fn new_wallet_address(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Decode a caller-supplied hex fingerprint so comparisons ignore casing and
/// surrounding whitespace. `None` means the input is not valid hex at all.
pub fn normalize_fingerprint(hash: &str) -> Option<Vec<u8>> {
    hex::decode(hash.trim()).ok()
}
