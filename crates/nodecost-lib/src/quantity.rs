//! Quantity normalization
//!
//! Converts Kubernetes quantity strings into canonical units: vCPU cores for
//! CPU and GiB for memory. Pure functions, no I/O.

use crate::error::UnitError;
use crate::models::{ResourceKind, ResourceQuantity};

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Parse a CPU quantity (`2`, `500m`, `250000u`, `100000000n`) into cores
pub fn parse_cpu(raw: &str) -> Result<ResourceQuantity, UnitError> {
    let kind = ResourceKind::CpuCores;
    let (value, suffix) = split(kind, raw)?;

    let cores = match suffix {
        "" => value,
        "m" => value / 1_000.0,
        "u" => value / 1_000_000.0,
        "n" => value / 1_000_000_000.0,
        other => {
            return Err(UnitError::new(
                kind,
                raw,
                format!("unknown cpu suffix '{other}'"),
            ))
        }
    };

    Ok(ResourceQuantity::cores(cores))
}

/// Parse a memory quantity (`1048576Ki`, `2048Mi`, `3Gi`, plain bytes) into GiB
pub fn parse_memory(raw: &str) -> Result<ResourceQuantity, UnitError> {
    let kind = ResourceKind::MemoryGib;
    let (value, suffix) = split(kind, raw)?;

    let gib = match suffix {
        "" => value / GIB,
        "Ki" => value / MIB,
        "Mi" => value / KIB,
        "Gi" => value,
        "Ti" => value * KIB,
        "k" => value * 1e3 / GIB,
        "M" => value * 1e6 / GIB,
        "G" => value * 1e9 / GIB,
        "T" => value * 1e12 / GIB,
        other => {
            return Err(UnitError::new(
                kind,
                raw,
                format!("unknown memory suffix '{other}'"),
            ))
        }
    };

    Ok(ResourceQuantity::gib(gib))
}

/// Split a quantity into its numeric value and unit suffix
fn split(kind: ResourceKind, raw: &str) -> Result<(f64, &str), UnitError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('-') {
        return Err(UnitError::new(kind, raw, "negative quantity"));
    }

    let boundary = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(boundary);

    if digits.is_empty() {
        return Err(UnitError::new(kind, raw, "missing numeric value"));
    }

    let value: f64 = digits
        .parse()
        .map_err(|_| UnitError::new(kind, raw, format!("invalid number '{digits}'")))?;

    Ok((value, suffix))
}
