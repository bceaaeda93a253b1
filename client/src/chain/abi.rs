//! Solidity ABI support for the campaign contract.
//!
//! Only the types this contract uses are covered: `uint*`, `address`,
//! `bool`, `bytes32`, `string`, dynamic arrays and tuples.

use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;

use crate::models::Address;

const WORD: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("Read past end of data at offset {offset} (len {len})")]
    OutOfBounds { offset: usize, len: usize },

    #[error("Value does not fit in {0}")]
    Overflow(&'static str),

    #[error("Invalid bool word")]
    InvalidBool,

    #[error("Invalid address word")]
    InvalidAddress,

    #[error("String is not valid UTF-8")]
    InvalidUtf8,
}

/// 256-bit big-endian word, the contract's native integer type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256([u8; WORD]);

impl U256 {
    pub const ZERO: U256 = U256([0u8; WORD]);

    pub const fn from_be_bytes(bytes: [u8; WORD]) -> Self {
        Self(bytes)
    }

    pub fn to_be_bytes(self) -> [u8; WORD] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn to_u128(self) -> Option<u128> {
        if self.0[..16].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&self.0[16..]);
        Some(u128::from_be_bytes(low))
    }

    pub fn to_u64(self) -> Option<u64> {
        self.to_u128().and_then(|v| u64::try_from(v).ok())
    }

    pub fn to_u8(self) -> Option<u8> {
        self.to_u128().and_then(|v| u8::try_from(v).ok())
    }

    /// Parses a JSON-RPC hex quantity such as `0x1bc16d674ec80000`.
    pub fn from_hex_quantity(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() || digits.len() > 64 {
            return None;
        }
        let padded = format!("{:0>64}", digits);
        let mut bytes = [0u8; WORD];
        hex::decode_to_slice(padded, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl From<u128> for U256 {
    fn from(value: u128) -> Self {
        let mut bytes = [0u8; WORD];
        bytes[16..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        U256::from(value as u128)
    }
}

impl From<u8> for U256 {
    fn from(value: u8) -> Self {
        U256::from(value as u128)
    }
}

impl From<bool> for U256 {
    fn from(value: bool) -> Self {
        U256::from(value as u8)
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_u128() {
            Some(v) => write!(f, "U256({})", v),
            None => write!(f, "U256(0x{})", hex::encode(self.0)),
        }
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// First four bytes of the keccak-256 of a canonical function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(U256),
    Address(Address),
    FixedBytes([u8; 32]),
    String(String),
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        match self {
            Token::String(_) | Token::Array(_) => true,
            Token::Tuple(items) => items.iter().any(Token::is_dynamic),
            _ => false,
        }
    }
}

/// Head/tail encoding of a parameter list.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(head_size).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&U256::from((head_len + tail.len()) as u64).to_be_bytes());
            tail.extend(encode_dynamic(token));
        } else {
            head.extend(encode_static(token));
        }
    }

    head.extend(tail);
    head
}

pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(tokens));
    data
}

fn head_size(token: &Token) -> usize {
    match token {
        Token::Tuple(items) if !token.is_dynamic() => items.iter().map(head_size).sum(),
        _ => WORD,
    }
}

fn encode_static(token: &Token) -> Vec<u8> {
    match token {
        Token::Uint(value) => value.to_be_bytes().to_vec(),
        Token::Address(address) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(address.as_bytes());
            word.to_vec()
        }
        Token::FixedBytes(bytes) => bytes.to_vec(),
        Token::Tuple(items) => encode(items),
        Token::String(_) | Token::Array(_) => unreachable!("dynamic token in static position"),
    }
}

fn encode_dynamic(token: &Token) -> Vec<u8> {
    match token {
        Token::String(s) => encode_bytes(s.as_bytes()),
        Token::Array(items) => {
            let mut out = U256::from(items.len() as u64).to_be_bytes().to_vec();
            out.extend(encode(items));
            out
        }
        Token::Tuple(items) => encode(items),
        _ => encode_static(token),
    }
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = U256::from(bytes.len() as u64).to_be_bytes().to_vec();
    out.extend_from_slice(bytes);
    let padding = (WORD - bytes.len() % WORD) % WORD;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

/// Read cursor over ABI-encoded data. Offsets are relative to the start of
/// the slice the decoder was built on.
#[derive(Debug, Clone, Copy)]
pub struct AbiDecoder<'a> {
    data: &'a [u8],
}

impl<'a> AbiDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn sub(&self, start: usize) -> Result<AbiDecoder<'a>, AbiError> {
        if start > self.data.len() {
            return Err(AbiError::OutOfBounds {
                offset: start,
                len: self.data.len(),
            });
        }
        Ok(AbiDecoder {
            data: &self.data[start..],
        })
    }

    pub fn uint(&self, offset: usize) -> Result<U256, AbiError> {
        let end = offset.checked_add(WORD).ok_or(AbiError::OutOfBounds {
            offset,
            len: self.data.len(),
        })?;
        let slice = self.data.get(offset..end).ok_or(AbiError::OutOfBounds {
            offset,
            len: self.data.len(),
        })?;
        let mut word = [0u8; WORD];
        word.copy_from_slice(slice);
        Ok(U256(word))
    }

    pub fn bool(&self, offset: usize) -> Result<bool, AbiError> {
        match self.uint(offset)?.to_u8() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(AbiError::InvalidBool),
        }
    }

    pub fn address(&self, offset: usize) -> Result<Address, AbiError> {
        let word = self.uint(offset)?.to_be_bytes();
        if word[..12].iter().any(|b| *b != 0) {
            return Err(AbiError::InvalidAddress);
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Ok(Address::from_bytes(bytes))
    }

    /// Reads a word used as an offset or length.
    pub fn offset(&self, offset: usize) -> Result<usize, AbiError> {
        let value = self
            .uint(offset)?
            .to_u64()
            .ok_or(AbiError::Overflow("usize"))?;
        let value = usize::try_from(value).map_err(|_| AbiError::Overflow("usize"))?;
        if value > self.data.len() {
            return Err(AbiError::OutOfBounds {
                offset: value,
                len: self.data.len(),
            });
        }
        Ok(value)
    }

    /// Reads a length-prefixed string starting at `at`.
    pub fn string(&self, at: usize) -> Result<String, AbiError> {
        let len = self.offset(at)?;
        let start = at + WORD;
        let bytes = self.data.get(start..start + len).ok_or(AbiError::OutOfBounds {
            offset: start,
            len: self.data.len(),
        })?;
        String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
    }
}

/// `campaignMetadata(uint256)` result, before normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCampaignMetadata {
    pub voting_type: U256,
    pub restriction: U256,
    pub result_type: U256,
    pub creator: Address,
    pub description: String,
    pub status: U256,
    pub start_time: U256,
    pub end_time: U256,
    pub max_voters: U256,
}

/// One `getProposals(uint256)` element, before normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProposal {
    pub content: String,
    pub vote_count: U256,
}

pub fn decode_campaign_metadata(data: &[u8]) -> Result<RawCampaignMetadata, AbiError> {
    let outer = AbiDecoder::new(data);
    let s = outer.sub(outer.offset(0)?)?;
    let description_at = s.offset(4 * WORD)?;

    Ok(RawCampaignMetadata {
        voting_type: s.uint(0)?,
        restriction: s.uint(WORD)?,
        result_type: s.uint(2 * WORD)?,
        creator: s.address(3 * WORD)?,
        description: s.string(description_at)?,
        status: s.uint(5 * WORD)?,
        start_time: s.uint(6 * WORD)?,
        end_time: s.uint(7 * WORD)?,
        max_voters: s.uint(8 * WORD)?,
    })
}

pub fn decode_proposals(data: &[u8]) -> Result<Vec<RawProposal>, AbiError> {
    let outer = AbiDecoder::new(data);
    let array = outer.sub(outer.offset(0)?)?;
    let len = array.offset(0)?;
    let items = array.sub(WORD)?;

    (0..len)
        .map(|i| {
            let element = items.sub(items.offset(i * WORD)?)?;
            Ok(RawProposal {
                content: element.string(element.offset(0)?)?,
                vote_count: element.uint(WORD)?,
            })
        })
        .collect()
}

pub fn decode_uint(data: &[u8]) -> Result<U256, AbiError> {
    AbiDecoder::new(data).uint(0)
}

pub fn decode_bool(data: &[u8]) -> Result<bool, AbiError> {
    AbiDecoder::new(data).bool(0)
}
