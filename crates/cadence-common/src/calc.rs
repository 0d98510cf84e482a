//! The calculation primitive shared by the RPC handlers and 2PC participants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CadenceError;

/// Closed set of operations a node can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Square,
    Cube,
}

impl Operation {
    pub const ALL: [Operation; 2] = [Operation::Square, Operation::Cube];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Square => "square",
            Self::Cube => "cube",
        }
    }

    /// Exponent applied to the operand
    fn power(&self) -> u32 {
        match self {
            Self::Square => 2,
            Self::Cube => 3,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CadenceError::LogicalFailure(format!("unknown operation '{s}'")))
    }
}

/// Apply `op` to `operand`.
///
/// Negative operands are rejected, and so is any result that does not fit in an `i64`.
pub fn calculate(op: Operation, operand: i64) -> Result<i64, CadenceError> {
    if operand < 0 {
        return Err(CadenceError::LogicalFailure(format!(
            "negative operand {operand} rejected"
        )));
    }

    operand.checked_pow(op.power()).ok_or_else(|| {
        CadenceError::LogicalFailure(format!("{op}({operand}) overflows a 64-bit result"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_table() {
        assert_eq!(calculate(Operation::Square, 4), Ok(16));
        assert_eq!(calculate(Operation::Cube, 16), Ok(4096));
        assert_eq!(calculate(Operation::Square, 0), Ok(0));
    }

    #[test]
    fn test_negative_operand_is_logical_failure() {
        let err = calculate(Operation::Square, -2).unwrap_err();
        assert!(matches!(err, CadenceError::LogicalFailure(_)));
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert!(calculate(Operation::Cube, 3_000_000).is_err());
        assert!(calculate(Operation::Square, 3_037_000_499).is_ok());
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!("Square".parse::<Operation>(), Ok(Operation::Square));
        assert_eq!(" cube ".parse::<Operation>(), Ok(Operation::Cube));
        assert!("sqrt".parse::<Operation>().is_err());
        assert_eq!(serde_json::to_string(&Operation::Cube).unwrap(), "\"cube\"");
    }
}
