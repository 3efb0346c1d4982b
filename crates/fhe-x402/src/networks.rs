//! Network identifier resolution.
//!
//! Requirements name their network either as a CAIP-2 identifier
//! (`eip155:11155111`) or by a well-known name (`sepolia`). The EIP-712
//! domain needs the numeric chain id, so every accepted form resolves here.

use crate::X402Error;

const NAMED_NETWORKS: &[(&str, u64)] = &[
    ("ethereum", 1),
    ("mainnet", 1),
    ("sepolia", 11155111),
    ("localhost", 31337),
    ("hardhat", 31337),
];

/// Resolve a network identifier to its EVM chain id.
pub fn chain_id(network: &str) -> Result<u64, X402Error> {
    if let Some(id) = network.strip_prefix("eip155:") {
        return id.parse::<u64>().map_err(|_| {
            X402Error::ConfigError(format!("invalid CAIP-2 chain reference: '{network}'"))
        });
    }

    NAMED_NETWORKS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(network))
        .map(|(_, id)| *id)
        .ok_or_else(|| X402Error::ConfigError(format!("unknown network: '{network}'")))
}

/// True if two identifiers name the same chain (`sepolia` == `eip155:11155111`).
pub fn same_network(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (chain_id(a), chain_id(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}
