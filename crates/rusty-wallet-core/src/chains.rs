//! Static chain table: enum <-> numeric id <-> hex id <-> network name <-> server id.

use serde::{Deserialize, Serialize};

use crate::domain::ChainId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChainEnum {
    Eth,
    Bsc,
    Polygon,
    Arbitrum,
    Op,
    Base,
    Gnosis,
    Avax,
}

impl ChainEnum {
    pub fn as_str(self) -> &'static str {
        self.info().key
    }

    pub fn info(self) -> &'static ChainInfo {
        CHAINS
            .iter()
            .find(|c| c.chain == self)
            .unwrap_or(&CHAINS[0])
    }

    pub fn id(self) -> ChainId {
        self.info().id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    pub chain: ChainEnum,
    pub key: &'static str,
    pub id: ChainId,
    pub hex: &'static str,
    pub name: &'static str,
    pub network: &'static str,
    pub server_id: &'static str,
}

pub const CHAINS: &[ChainInfo] = &[
    ChainInfo {
        chain: ChainEnum::Eth,
        key: "ETH",
        id: 1,
        hex: "0x1",
        name: "Ethereum",
        network: "1",
        server_id: "eth",
    },
    ChainInfo {
        chain: ChainEnum::Bsc,
        key: "BSC",
        id: 56,
        hex: "0x38",
        name: "BNB Chain",
        network: "56",
        server_id: "bsc",
    },
    ChainInfo {
        chain: ChainEnum::Polygon,
        key: "POLYGON",
        id: 137,
        hex: "0x89",
        name: "Polygon",
        network: "137",
        server_id: "matic",
    },
    ChainInfo {
        chain: ChainEnum::Arbitrum,
        key: "ARBITRUM",
        id: 42161,
        hex: "0xa4b1",
        name: "Arbitrum",
        network: "42161",
        server_id: "arb",
    },
    ChainInfo {
        chain: ChainEnum::Op,
        key: "OP",
        id: 10,
        hex: "0xa",
        name: "Optimism",
        network: "10",
        server_id: "op",
    },
    ChainInfo {
        chain: ChainEnum::Base,
        key: "BASE",
        id: 8453,
        hex: "0x2105",
        name: "Base",
        network: "8453",
        server_id: "base",
    },
    ChainInfo {
        chain: ChainEnum::Gnosis,
        key: "GNOSIS",
        id: 100,
        hex: "0x64",
        name: "Gnosis Chain",
        network: "100",
        server_id: "xdai",
    },
    ChainInfo {
        chain: ChainEnum::Avax,
        key: "AVAX",
        id: 43114,
        hex: "0xa86a",
        name: "Avalanche",
        network: "43114",
        server_id: "avax",
    },
];

pub fn chain_by_id(id: ChainId) -> Option<&'static ChainInfo> {
    CHAINS.iter().find(|c| c.id == id)
}

pub fn chain_by_hex(hex: &str) -> Option<&'static ChainInfo> {
    parse_chain_id(hex).and_then(chain_by_id)
}

pub fn chain_by_server_id(server_id: &str) -> Option<&'static ChainInfo> {
    CHAINS.iter().find(|c| c.server_id == server_id)
}

/// Accepts `0x`-prefixed hex or decimal text.
pub fn parse_chain_id(raw: &str) -> Option<ChainId> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}
