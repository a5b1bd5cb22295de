use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The two assets a payment can be made in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    /// The chain's base currency, also used to pay network fees.
    #[default]
    Native,
    /// The stable token, moved through a contract `transfer` call.
    Token,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::Token => "token",
        })
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "eth" => Ok(Self::Native),
            "token" | "usdc" => Ok(Self::Token),
            other => Err(format!("unknown asset `{other}`, expected `native` or `token`")),
        }
    }
}

/// Fiat currencies quoted by the price feed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fiat {
    #[default]
    Inr,
    Usd,
}

impl Fiat {
    pub const ALL: [Self; 2] = [Self::Inr, Self::Usd];

    /// The lowercase currency code used by the price feed.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Inr => "inr",
            Self::Usd => "usd",
        }
    }
}

impl fmt::Display for Fiat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code().to_ascii_uppercase())
    }
}

impl FromStr for Fiat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inr" => Ok(Self::Inr),
            "usd" => Ok(Self::Usd),
            other => Err(format!("unsupported fiat currency `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_asset_aliases() {
        assert_eq!("ETH".parse::<Asset>().unwrap(), Asset::Native);
        assert_eq!("token".parse::<Asset>().unwrap(), Asset::Token);
        assert_eq!("usdc".parse::<Asset>().unwrap(), Asset::Token);
        assert!("dai".parse::<Asset>().is_err());
    }

    #[test]
    fn fiat_codes() {
        assert_eq!("INR".parse::<Fiat>().unwrap(), Fiat::Inr);
        assert_eq!(Fiat::Usd.code(), "usd");
        assert_eq!(Fiat::Usd.to_string(), "USD");
    }
}
