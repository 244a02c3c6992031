//! Numeric range and IP network matching.

use crate::error::{DecoyError, Result};
use serde_json::{json, Value};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Inclusive numeric range; an unset bound is open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    /// Parse `{"Min": 1, "Max": 10}` or the string form `"1..10"`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let invalid = |reason: &str| {
            DecoyError::invalid_pattern("NumericRangeMatcher", value.to_string(), reason)
        };
        let range = match value {
            Value::Object(map) => {
                let bound = |key: &str| -> Result<Option<f64>> {
                    match map.get(key) {
                        None | Some(Value::Null) => Ok(None),
                        Some(v) => v
                            .as_f64()
                            .map(Some)
                            .ok_or_else(|| invalid("bounds must be numbers")),
                    }
                };
                NumericRange {
                    min: bound("Min")?,
                    max: bound("Max")?,
                }
            }
            Value::String(s) => {
                let (min, max) = s
                    .split_once("..")
                    .ok_or_else(|| invalid("expected 'min..max'"))?;
                let parse = |part: &str| -> Result<Option<f64>> {
                    let part = part.trim();
                    if part.is_empty() {
                        return Ok(None);
                    }
                    part.parse::<f64>()
                        .map(Some)
                        .map_err(|_| invalid("bounds must be numbers"))
                };
                NumericRange {
                    min: parse(min)?,
                    max: parse(max)?,
                }
            }
            _ => return Err(invalid("expected an object with Min/Max")),
        };

        if let (Some(min), Some(max)) = (range.min, range.max) {
            if min > max {
                return Err(invalid("Min is greater than Max"));
            }
        }
        Ok(range)
    }

    pub fn to_value(&self) -> Value {
        json!({ "Min": self.min, "Max": self.max })
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    pub fn contains_str(&self, value: &str) -> bool {
        value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| !v.is_nan())
            .is_some_and(|v| self.contains(v))
    }
}

/// An IP network in CIDR notation. A bare address is a host network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for IpNetwork {
    type Err = DecoyError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| DecoyError::invalid_pattern("CidrMatcher", s, reason);
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (
                addr,
                Some(
                    prefix
                        .parse::<u8>()
                        .map_err(|_| invalid("prefix length is not a number"))?,
                ),
            ),
            None => (s.trim(), None),
        };
        let addr: IpAddr = addr.parse().map_err(|_| invalid("invalid IP address"))?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = prefix.unwrap_or(max);
        if prefix > max {
            return Err(invalid("prefix length out of range"));
        }
        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Parse an address, tolerating `[v6]` brackets and IPv4-mapped IPv6.
pub(crate) fn parse_ip(value: &str) -> Option<IpAddr> {
    let trimmed = value.trim().trim_start_matches('[').trim_end_matches(']');
    trimmed.parse::<IpAddr>().ok().map(|ip| ip.to_canonical())
}
