//! Minimal Solidity ABI word codec.
//!
//! Only static types are needed by the staking and token surfaces: `address`, `uint256` and
//! `bool`, each occupying one 32-byte word.

use crate::{Address, Amount, Result, StakeflowError};
use sha3::{Digest, Keccak256};

pub const WORD: usize = 32;

/// Static ABI argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(Amount),
    Bool(bool),
}

impl Token {
    fn to_word(self) -> [u8; WORD] {
        let mut word = [0u8; WORD];
        match self {
            Token::Address(addr) => word[12..].copy_from_slice(&addr.0),
            Token::Uint(value) => word[16..].copy_from_slice(&value.to_be_bytes()),
            Token::Bool(flag) => word[31] = u8::from(flag),
        }
        word
    }
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Concatenate argument words without a selector.
pub fn encode_words(args: &[Token]) -> Vec<u8> {
    let mut out = Vec::with_capacity(args.len() * WORD);
    for arg in args {
        out.extend_from_slice(&arg.to_word());
    }
    out
}

/// Calldata for `signature(args...)`.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + args.len() * WORD);
    out.extend_from_slice(&selector(signature));
    out.extend_from_slice(&encode_words(args));
    out
}

/// Split return data into exactly `count` words.
pub fn decode_words(data: &[u8], count: usize) -> Result<Vec<[u8; WORD]>> {
    if data.len() < count * WORD {
        return Err(StakeflowError::AbiError(format!(
            "expected {count} words ({} bytes), got {} bytes",
            count * WORD,
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(WORD)
        .take(count)
        .map(|chunk| {
            let mut word = [0u8; WORD];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// Interpret one word as an unsigned integer. Values wider than 128 bits are rejected.
pub fn word_to_uint(word: &[u8; WORD]) -> Result<Amount> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(StakeflowError::AbiError(format!(
            "uint256 value 0x{} exceeds 128 bits",
            hex::encode(word)
        )));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(Amount::from_be_bytes(low))
}

/// Interpret one word as an unsigned integer, clamping anything at or above 2^128 to
/// `Amount::MAX`. Used for balances and allowances, where `type(uint256).max` is common.
pub fn word_to_uint_saturating(word: &[u8; WORD]) -> Amount {
    if word[..16].iter().any(|b| *b != 0) {
        return Amount::MAX;
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Amount::from_be_bytes(low)
}

pub fn word_to_u64(word: &[u8; WORD]) -> Result<u64> {
    let value = word_to_uint(word)?;
    u64::try_from(value)
        .map_err(|_| StakeflowError::AbiError(format!("value {value} does not fit in u64")))
}

pub fn decode_uint(data: &[u8]) -> Result<Amount> {
    let words = decode_words(data, 1)?;
    word_to_uint(&words[0])
}

pub fn decode_uint_saturating(data: &[u8]) -> Result<Amount> {
    let words = decode_words(data, 1)?;
    Ok(word_to_uint_saturating(&words[0]))
}

pub fn decode_u64(data: &[u8]) -> Result<u64> {
    let words = decode_words(data, 1)?;
    word_to_u64(&words[0])
}

pub fn decode_bool(data: &[u8]) -> Result<bool> {
    let words = decode_words(data, 1)?;
    match word_to_uint(&words[0])? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StakeflowError::AbiError(format!(
            "invalid bool word value {other}"
        ))),
    }
}
