//! b-value shells and the per-shell lmax list that must line up with them.
use crate::error::PreconditionError;
use anyhow::{anyhow, Result};

/// Ordered, distinct b-values as reported by the image header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shells(Vec<u32>);

impl Shells {
    /// Parse whitespace-separated header output, rounding each value.
    pub fn parse(text: &str) -> Result<Self> {
        let mut values = Vec::new();
        for token in text.split_whitespace() {
            let value: f64 = token
                .parse()
                .map_err(|_| anyhow!("unparseable shell b-value {token:?}"))?;
            let rounded = value.round();
            if !rounded.is_finite() || rounded < 0.0 || rounded > f64::from(u32::MAX) {
                return Err(anyhow!("invalid shell b-value {token:?}"));
            }
            values.push(rounded as u32);
        }
        if values.is_empty() {
            return Err(PreconditionError::NoShells.into());
        }
        Ok(Self(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[u32] {
        &self.0
    }

    /// Compact `a,b,c` form used on tool command lines.
    pub fn option_value(&self) -> String {
        join_values(&self.0)
    }
}

/// Per-shell lmax values, index `i` applying to shell `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmaxList(Vec<u32>);

impl LmaxList {
    /// Parse a comma-separated `-lmax` argument and check it against `shells`.
    ///
    /// The count is checked before any individual value, so a list of the
    /// wrong length is reported as such even if it also holds odd entries.
    pub fn parse_for(raw: &str, shells: &Shells) -> Result<Self, PreconditionError> {
        let mut parsed = Vec::new();
        for token in raw.split(',') {
            let token = token.trim();
            let value: i64 = token
                .parse()
                .map_err(|_| PreconditionError::LmaxParse(token.to_string()))?;
            parsed.push(value);
        }
        if parsed.len() != shells.len() {
            return Err(PreconditionError::LmaxCount {
                supplied: parsed.len(),
                shells: shells.len(),
            });
        }
        let mut values = Vec::with_capacity(parsed.len());
        for value in parsed {
            if value % 2 != 0 {
                return Err(PreconditionError::LmaxOdd(value));
            }
            if value < 0 {
                return Err(PreconditionError::LmaxNegative(value));
            }
            let value = u32::try_from(value).map_err(|_| PreconditionError::LmaxRange(value))?;
            values.push(value);
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[u32] {
        &self.0
    }

    pub fn option_value(&self) -> String {
        join_values(&self.0)
    }
}

fn join_values(values: &[u32]) -> String {
    values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
