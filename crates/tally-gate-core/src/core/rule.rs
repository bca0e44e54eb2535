// crates/tally-gate-core/src/core/rule.rs
// ============================================================================
// Module: Tally Gate Approval Rules
// Description: Validated approval rule sum type and its JSON boundary.
// Purpose: Reject malformed rules when a decision is created or updated.
// Dependencies: bigdecimal, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Decisions carry their approval rule as loosely typed JSON
//! (`{"type": "threshold", "value": 0.66}`). The rule is parsed exactly once,
//! at the decision management boundary, into [`RuleSpec`]. Evaluation only
//! ever sees the validated sum type. Threshold values keep both the wire
//! `f64` and an exact decimal rendering used for comparisons.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted size of a raw rule payload (bytes).
pub const MAX_RULE_JSON_BYTES: usize = 4 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Rule validation failures raised at decision create/update time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleValidationError {
    /// Rule payload is not a JSON object with a string `type`.
    #[error("malformed rule: {0}")]
    Malformed(String),
    /// Rule type is not one of the supported kinds.
    #[error("unknown rule type: {0}")]
    UnknownType(String),
    /// Threshold rule is missing its numeric `value`.
    #[error("threshold rule requires a numeric value")]
    MissingValue,
    /// Threshold value is not finite or outside `[0, 1]`.
    #[error("threshold value must be within [0, 1], got {0}")]
    OutOfRange(f64),
}

// ============================================================================
// SECTION: Threshold Value
// ============================================================================

/// Validated threshold ratio.
///
/// # Invariants
/// - Finite and within `[0, 1]`.
/// - `decimal` is the exact decimal rendering of `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdValue {
    /// Wire value.
    value: f64,
    /// Exact decimal used for comparisons.
    decimal: BigDecimal,
}

impl ThresholdValue {
    /// Validates a threshold ratio.
    ///
    /// # Errors
    ///
    /// Returns [`RuleValidationError::OutOfRange`] when the value is not
    /// finite or outside `[0, 1]`.
    pub fn new(value: f64) -> Result<Self, RuleValidationError> {
        if !value.is_finite() || !(0.0 ..= 1.0).contains(&value) {
            return Err(RuleValidationError::OutOfRange(value));
        }
        // Collapses -0.0 so stored rules never echo a signed zero.
        let value = value + 0.0;
        // f64 Display is the shortest literal that round-trips, never exponent form.
        let decimal = BigDecimal::from_str(&value.to_string())
            .map_err(|_| RuleValidationError::OutOfRange(value))?;
        Ok(Self {
            value,
            decimal,
        })
    }

    /// Returns the wire value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Returns the exact decimal form of the threshold.
    #[must_use]
    pub const fn as_decimal(&self) -> &BigDecimal {
        &self.decimal
    }
}

impl Serialize for ThresholdValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value)
    }
}

impl<'de> Deserialize<'de> for ThresholdValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Rule Spec
// ============================================================================

/// Approval rule of a decision.
///
/// # Invariants
/// - Only constructed through validation; the evaluator never re-checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleSpec {
    /// Every confirmed member must approve.
    Unanimous,
    /// The approval ratio must reach `value`.
    Threshold {
        /// Required approvals / confirmed members ratio.
        value: ThresholdValue,
    },
}

impl RuleSpec {
    /// Builds a threshold rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleValidationError::OutOfRange`] for invalid ratios.
    pub fn threshold(value: f64) -> Result<Self, RuleValidationError> {
        Ok(Self::Threshold {
            value: ThresholdValue::new(value)?,
        })
    }

    /// Returns the stable rule type label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unanimous => "unanimous",
            Self::Threshold {
                ..
            } => "threshold",
        }
    }

    /// Validates a loosely typed rule payload.
    ///
    /// # Errors
    ///
    /// Returns [`RuleValidationError`] for unknown types, missing values, or
    /// out-of-range thresholds.
    pub fn from_json(raw: &Value) -> Result<Self, RuleValidationError> {
        let Value::Object(fields) = raw else {
            return Err(RuleValidationError::Malformed("rule must be a json object".to_string()));
        };
        let Some(kind) = fields.get("type").and_then(Value::as_str) else {
            return Err(RuleValidationError::Malformed("rule type must be a string".to_string()));
        };
        if let Some(extra) = fields.keys().find(|key| *key != "type" && *key != "value") {
            return Err(RuleValidationError::Malformed(format!("unexpected rule field: {extra}")));
        }
        let value = fields.get("value").filter(|value| !value.is_null());
        match kind {
            "unanimous" => {
                if value.is_some() {
                    return Err(RuleValidationError::Malformed(
                        "unanimous rule does not take a value".to_string(),
                    ));
                }
                Ok(Self::Unanimous)
            }
            "threshold" => {
                let ratio = value
                    .and_then(Value::as_f64)
                    .ok_or(RuleValidationError::MissingValue)?;
                Self::threshold(ratio)
            }
            other => Err(RuleValidationError::UnknownType(other.to_string())),
        }
    }

    /// Validates a rule payload from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`RuleValidationError`] when the text is oversized, not JSON,
    /// or not a valid rule.
    pub fn from_json_str(raw: &str) -> Result<Self, RuleValidationError> {
        if raw.len() > MAX_RULE_JSON_BYTES {
            return Err(RuleValidationError::Malformed("rule payload exceeds size limit".to_string()));
        }
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| RuleValidationError::Malformed(err.to_string()))?;
        Self::from_json(&value)
    }

    /// Returns the rule echo stored in selection snapshots.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Unanimous => serde_json::json!({ "type": "unanimous" }),
            Self::Threshold {
                value,
            } => serde_json::json!({ "type": "threshold", "value": value.value() }),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
