//! Core types - Strong typing for personas, trades and wallets

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::{Error, Result};

/// Oasis Sapphire mainnet (0x5AFE)
pub const SAPPHIRE_MAINNET_ID: u64 = 23294;
/// Oasis Sapphire testnet (0x5AFF)
pub const SAPPHIRE_TESTNET_ID: u64 = 23295;

/// Parse a fixed-size, optionally `0x`-prefixed hex string
fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N]> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| Error::Validation(format!("bad hex '{}': {}", s, e)))?;
    bytes
        .try_into()
        .map_err(|_| Error::Validation(format!("expected {} bytes, got '{}'", N, s)))
}

/// Opaque persona identifier assigned by the ledger (bytes32 on-chain)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PersonaId([u8; 32]);

impl PersonaId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for PersonaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for PersonaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form keeps logs readable
        write!(f, "PersonaId(0x{}..)", hex::encode(&self.0[..4]))
    }
}

impl FromStr for PersonaId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex::<32>(s).map(Self)
    }
}

impl From<PersonaId> for String {
    fn from(id: PersonaId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for PersonaId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// 20-byte account address of the connected wallet
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct WalletAddress([u8; 20]);

impl WalletAddress {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalletAddress({})", self)
    }
}

impl FromStr for WalletAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex::<20>(s).map(Self)
    }
}

impl From<WalletAddress> for String {
    fn from(addr: WalletAddress) -> Self {
        addr.to_string()
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Numeric EVM chain id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const SAPPHIRE_MAINNET: ChainId = ChainId(SAPPHIRE_MAINNET_ID);
    pub const SAPPHIRE_TESTNET: ChainId = ChainId(SAPPHIRE_TESTNET_ID);

    /// True only for the Sapphire networks, where persona metadata and
    /// histories stay confidential.
    pub fn is_confidential(&self) -> bool {
        matches!(self.0, SAPPHIRE_MAINNET_ID | SAPPHIRE_TESTNET_ID)
    }

    pub fn name(&self) -> &'static str {
        match self.0 {
            SAPPHIRE_MAINNET_ID => "sapphire-mainnet",
            SAPPHIRE_TESTNET_ID => "sapphire-testnet",
            _ => "unsupported",
        }
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// Token symbol (e.g., "ETH"), always trimmed and upper-cased
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Token(String);

impl Token {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::new(s)
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token::new(s)
    }
}

/// Token quantity with arbitrary precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub fn new(value: impl Into<Decimal>) -> Self {
        Self(value.into())
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(Decimal::from(v))
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Decimal::from_str(s.trim())
            .map(Self)
            .map_err(|e| Error::Validation(format!("bad amount '{}': {}", s, e)))
    }
}

/// Opaque persona metadata. Never interpreted here; confidentiality is the
/// ledger's job, so `Debug` only reveals the length.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata(Vec<u8>);

impl Metadata {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Metadata(<{} bytes>)", self.0.len())
    }
}

/// Pseudonymous trading identity owned by one wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: PersonaId,
    pub name: String,
    pub metadata: Metadata,
}

/// A settled swap, attributed to the persona active at settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub persona_id: PersonaId,
    pub input_token: Token,
    pub output_token: Token,
    pub amount_in: Amount,
    pub min_amount_out: Amount,
    pub amount_out: Amount,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: Option<String>,
}

/// Swap parameters as submitted by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub input_token: Token,
    pub output_token: Token,
    pub amount_in: Amount,
    pub min_amount_out: Amount,
    /// Persona to switch to immediately before settlement
    pub switch_to: Option<PersonaId>,
}

impl SwapRequest {
    pub fn new(
        input_token: impl Into<Token>,
        output_token: impl Into<Token>,
        amount_in: impl Into<Amount>,
        min_amount_out: impl Into<Amount>,
    ) -> Self {
        Self {
            input_token: input_token.into(),
            output_token: output_token.into(),
            amount_in: amount_in.into(),
            min_amount_out: min_amount_out.into(),
            switch_to: None,
        }
    }

    /// Switch identity mid-trade before the swap settles
    pub fn switching_to(mut self, persona: PersonaId) -> Self {
        self.switch_to = Some(persona);
        self
    }

    /// Reject malformed input before anything touches the ledger
    pub fn validate(&self) -> Result<()> {
        if self.input_token.is_empty() || self.output_token.is_empty() {
            return Err(Error::Validation("token symbol must not be empty".into()));
        }
        if self.input_token == self.output_token {
            return Err(Error::Validation(format!(
                "input and output token are both {}",
                self.input_token
            )));
        }
        if !self.amount_in.is_positive() {
            return Err(Error::Validation(format!(
                "amount in must be positive, got {}",
                self.amount_in
            )));
        }
        if self.min_amount_out.is_negative() {
            return Err(Error::Validation(format!(
                "min amount out must not be negative, got {}",
                self.min_amount_out
            )));
        }
        Ok(())
    }
}
