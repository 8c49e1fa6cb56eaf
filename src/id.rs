//! Conversion between the string ids callers see and the integer primary
//! keys the store uses.

use crate::error::{Error, Result};

/// Parse an external id. Only base-10 integers in `1..=i64::MAX` are accepted.
pub fn decode(s: &str) -> Result<i64> {
    match s.parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(Error::InvalidArgument(format!(
            "invalid todo id '{s}': must be a positive integer"
        ))),
        Err(e) => Err(Error::InvalidArgument(format!("invalid todo id '{s}': {e}"))),
    }
}

pub fn encode(id: i64) -> String {
    id.to_string()
}
