use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// All blockchains Tollgate can scan for deposits
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Tron,
    Polygon,
    Aptos,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Tron, Chain::Polygon, Chain::Aptos];

    /// Lowercase identifier used in config files, logs and payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Tron => "tron",
            Chain::Polygon => "polygon",
            Chain::Aptos => "aptos",
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown chain: {0}")]
pub struct UnknownChain(pub String);

impl std::str::FromStr for Chain {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chain::ALL
            .into_iter()
            .find(|chain| chain.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownChain(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("APTOS".parse::<Chain>().unwrap(), Chain::Aptos);
        assert_eq!("tron".parse::<Chain>().unwrap(), Chain::Tron);
        assert!("solana".parse::<Chain>().is_err());
    }
}
