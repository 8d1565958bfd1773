//! Decoders for dynamic storage values
//!
//! Storage reads come back as untyped `scale_value` trees. Numeric newtypes
//! (balances, currencies) arrive wrapped in single-field composites, so the
//! numeric decoders unwrap those before matching a primitive.

use sp_core::crypto::{AccountId32, Ss58Codec};
use subxt::dynamic::Value;
use subxt::ext::scale_value::{Composite, Primitive, ValueDef};

use super::Error;

fn single_field(composite: &Composite<()>) -> Option<&Value> {
    match composite {
        Composite::Named(fields) if fields.len() == 1 => Some(&fields[0].1),
        Composite::Unnamed(values) if values.len() == 1 => Some(&values[0]),
        _ => None,
    }
}

fn fields(composite: &Composite<()>) -> Vec<&Value> {
    match composite {
        Composite::Named(fields) => fields.iter().map(|(_, v)| v).collect(),
        Composite::Unnamed(values) => values.iter().collect(),
    }
}

pub fn decode_u128(value: &Value) -> Result<u128, Error> {
    match &value.value {
        ValueDef::Primitive(Primitive::U128(n)) => Ok(*n),
        ValueDef::Primitive(Primitive::I128(n)) if *n >= 0 => Ok(*n as u128),
        ValueDef::Composite(c) => match single_field(c) {
            Some(inner) => decode_u128(inner),
            None => Err(Error::Decoding(format!("expected a number, got {:?}", value))),
        },
        _ => Err(Error::Decoding(format!("expected a number, got {:?}", value))),
    }
}

pub fn decode_u16(value: &Value) -> Result<u16, Error> {
    let n = decode_u128(value)?;
    u16::try_from(n).map_err(|_| Error::Decoding(format!("{} does not fit into u16", n)))
}

pub fn decode_bool(value: &Value) -> Result<bool, Error> {
    match &value.value {
        ValueDef::Primitive(Primitive::Bool(b)) => Ok(*b),
        ValueDef::Primitive(Primitive::U128(n)) => Ok(*n != 0),
        _ => Err(Error::Decoding(format!("expected a bool, got {:?}", value))),
    }
}

pub fn decode_vec_bool(value: &Value) -> Result<Vec<bool>, Error> {
    match &value.value {
        ValueDef::Composite(c) => fields(c).into_iter().map(decode_bool).collect(),
        _ => Err(Error::Decoding(format!("expected a sequence, got {:?}", value))),
    }
}

fn collect_bytes(value: &Value, out: &mut Vec<u8>) -> bool {
    match &value.value {
        ValueDef::Primitive(Primitive::U128(n)) if *n <= u8::MAX as u128 => {
            out.push(*n as u8);
            true
        }
        ValueDef::Composite(c) => fields(c).into_iter().all(|v| collect_bytes(v, out)),
        _ => false,
    }
}

/// Decode an account id stored as 32 bytes, possibly inside newtype wrappers
pub fn decode_account_id32(value: &Value) -> Result<AccountId32, Error> {
    let mut bytes = Vec::with_capacity(32);
    if !collect_bytes(value, &mut bytes) {
        return Err(Error::Decoding(format!("expected account bytes, got {:?}", value)));
    }
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| Error::Decoding(format!("account id has {} bytes", b.len())))?;
    Ok(AccountId32::from(array))
}

/// Decode an account id straight to its SS58 address
pub fn decode_ss58(value: &Value) -> Result<String, Error> {
    decode_account_id32(value).map(|a| a.to_ss58check())
}

/// Convert a u16-normalised fraction (`u16::MAX` = 1.0) to f64
pub fn u16_fraction(raw: u16) -> f64 {
    raw as f64 / u16::MAX as f64
}
