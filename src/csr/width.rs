//! Port size expression resolution.
//!
//! Accepted forms:
//!
//! ```text
//!   8              plain bit count (integer or string)
//!   "[7:0]"        HI - LO + 1
//!   "[WIDTH-1:0]"  HI taken from an integer parameter, adjusted by +/- k
//!   "[WIDTH+3:4]"
//! ```
//!
//! The low bound is always a literal. The result is not range-checked here;
//! the compiler rejects widths outside `1..=64` with the port name.

use std::sync::LazyLock;

use regex::Regex;

use super::{ParameterSpec, PortWidth};
use crate::error::{ConfigError, ConfigResult};

struct Patterns {
    plain: Regex,
    range: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    plain: Regex::new(r"^\s*(\d+)\s*$").unwrap(),
    range: Regex::new(r"^\[\s*(\w+)\s*(?:([+-])\s*(\d+))?\s*:\s*(\d+)\s*\]$").unwrap(),
});

/// Resolve a port width to a bit count.
pub fn resolve_width(
    port: &str,
    width: &PortWidth,
    params: &[ParameterSpec],
) -> ConfigResult<i64> {
    let expr = match width {
        PortWidth::Bits(bits) => return Ok(*bits),
        PortWidth::Expr(expr) => expr.trim(),
    };

    let malformed = || ConfigError::InvalidWidthExpr {
        port: port.to_string(),
        expr: expr.to_string(),
    };

    if let Some(caps) = PATTERNS.plain.captures(expr) {
        return caps[1].parse::<i64>().map_err(|_| malformed());
    }

    let caps = PATTERNS.range.captures(expr).ok_or_else(malformed)?;

    let hi_token = &caps[1];
    let mut hi = if hi_token.chars().all(|c| c.is_ascii_digit()) {
        hi_token.parse::<i64>().map_err(|_| malformed())?
    } else {
        lookup_param(port, hi_token, params)?
    };

    if let (Some(op), Some(k)) = (caps.get(2), caps.get(3)) {
        let k = k.as_str().parse::<i64>().map_err(|_| malformed())?;
        hi = match op.as_str() {
            "+" => hi.checked_add(k),
            _ => hi.checked_sub(k),
        }
        .ok_or_else(malformed)?;
    }

    let lo = caps[4].parse::<i64>().map_err(|_| malformed())?;
    hi.checked_sub(lo)
        .and_then(|span| span.checked_add(1))
        .ok_or_else(malformed)
}

fn lookup_param(port: &str, name: &str, params: &[ParameterSpec]) -> ConfigResult<i64> {
    let param = params
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| ConfigError::UnknownParameter {
            port: port.to_string(),
            parameter: name.to_string(),
        })?;

    param.value.as_int().ok_or_else(|| ConfigError::InvalidWidthExpr {
        port: port.to_string(),
        expr: format!("{} = {} is not an integer", name, param.value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csr::ParamValue;

    fn expr(s: &str) -> PortWidth {
        PortWidth::Expr(s.to_string())
    }

    #[test]
    fn test_plain_widths() {
        assert_eq!(resolve_width("p", &PortWidth::Bits(4), &[]).unwrap(), 4);
        assert_eq!(resolve_width("p", &expr("1"), &[]).unwrap(), 1);
        assert_eq!(resolve_width("p", &expr(" 16 "), &[]).unwrap(), 16);
    }

    #[test]
    fn test_literal_range() {
        assert_eq!(resolve_width("p", &expr("[7:0]"), &[]).unwrap(), 8);
        assert_eq!(resolve_width("p", &expr("[ 15 : 8 ]"), &[]).unwrap(), 8);
    }

    #[test]
    fn test_parameterised_range() {
        let params = vec![ParameterSpec::int("WIDTH", 12)];
        assert_eq!(resolve_width("p", &expr("[WIDTH-1:0]"), &params).unwrap(), 12);
        assert_eq!(resolve_width("p", &expr("[WIDTH + 3 : 0]"), &params).unwrap(), 16);
        assert_eq!(resolve_width("p", &expr("[WIDTH:4]"), &params).unwrap(), 9);
    }

    #[test]
    fn test_unknown_parameter() {
        let err = resolve_width("data", &expr("[DEPTH-1:0]"), &[]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownParameter {
                port: "data".to_string(),
                parameter: "DEPTH".to_string(),
            }
        );
    }

    #[test]
    fn test_malformed_expressions() {
        let params = vec![ParameterSpec::new("MODE", ParamValue::Str("x".to_string()))];
        for bad in ["7:0", "[7-0]", "[A*2:0]", "wide", "[MODE-1:0]"] {
            let err = resolve_width("p", &expr(bad), &params).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidWidthExpr { .. }),
                "{} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_overflowing_expressions() {
        let params = vec![ParameterSpec::int("WIDTH", i64::MAX)];
        for bad in ["[9223372036854775807:0]", "[WIDTH+1:0]", "[99999999999999999999:0]"] {
            let err = resolve_width("big", &expr(bad), &params).unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidWidthExpr {
                    port: "big".to_string(),
                    expr: bad.to_string(),
                }
            );
        }
    }
}
