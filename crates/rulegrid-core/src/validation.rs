use lazy_static::lazy_static;
use regex::Regex;

use crate::{CellValue, Result, RuleGridError};

pub const MAX_NAME_LENGTH: usize = 128;

/// What a value rule can see about the value being written.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Property key inside a default-constraint set.
    pub key: &'a str,
    /// Golden (reference) value for the same key, if any.
    pub golden: Option<&'a CellValue>,
}

/// Pluggable policy applied to proposed values before they are stored.
pub trait ValueRule: Send + Sync {
    fn name(&self) -> &str;

    /// `Err(reason)` rejects the value.
    fn check(
        &self,
        ctx: &RuleContext<'_>,
        proposed: &CellValue,
    ) -> std::result::Result<(), String>;
}

/// Editable values may never drop below the golden value.
///
/// Only applies when both values are numeric; anything else passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoldenFloorRule;

impl ValueRule for GoldenFloorRule {
    fn name(&self) -> &str {
        "golden_floor"
    }

    fn check(
        &self,
        ctx: &RuleContext<'_>,
        proposed: &CellValue,
    ) -> std::result::Result<(), String> {
        let golden = ctx.golden.and_then(CellValue::as_number);
        let (Some(golden), Some(value)) = (golden, proposed.as_number()) else {
            return Ok(());
        };
        if value < golden {
            return Err(format!(
                "{} = {} is below the golden value {}",
                ctx.key, value, golden
            ));
        }
        Ok(())
    }
}

pub fn run_rules(
    rules: &[Box<dyn ValueRule>],
    ctx: &RuleContext<'_>,
    proposed: &CellValue,
) -> Result<()> {
    for rule in rules {
        if let Err(reason) = rule.check(ctx, proposed) {
            return Err(RuleGridError::PolicyViolation {
                rule: rule.name().to_string(),
                reason,
            });
        }
    }
    Ok(())
}

/// Netclass and relation-brand name validation
pub struct NameValidator;

impl NameValidator {
    pub fn validate(name: &str) -> Result<()> {
        lazy_static! {
            static ref NAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_\-\.\+#/\[\]:]+$").unwrap();
        }

        if name.is_empty() {
            return Err(RuleGridError::InvalidName {
                name: name.to_string(),
                reason: "name is required".to_string(),
            });
        }

        if name.len() > MAX_NAME_LENGTH {
            return Err(RuleGridError::InvalidName {
                name: name.to_string(),
                reason: format!("longer than {} characters", MAX_NAME_LENGTH),
            });
        }

        if !NAME_REGEX.is_match(name) {
            return Err(RuleGridError::InvalidName {
                name: name.to_string(),
                reason: "contains invalid characters".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_floor_rejects_lower_numbers() {
        let golden = CellValue::Number(4.0);
        let ctx = RuleContext {
            key: "min_width",
            golden: Some(&golden),
        };
        assert!(GoldenFloorRule.check(&ctx, &CellValue::Number(4.0)).is_ok());
        assert!(GoldenFloorRule.check(&ctx, &CellValue::Number(5.5)).is_ok());
        assert!(GoldenFloorRule.check(&ctx, &CellValue::Number(3.9)).is_err());
    }

    #[test]
    fn golden_floor_ignores_non_numeric() {
        let golden = CellValue::Text("W4".into());
        let ctx = RuleContext {
            key: "min_width",
            golden: Some(&golden),
        };
        assert!(GoldenFloorRule.check(&ctx, &CellValue::Number(0.1)).is_ok());

        let ctx = RuleContext {
            key: "min_width",
            golden: None,
        };
        assert!(GoldenFloorRule.check(&ctx, &CellValue::Number(0.1)).is_ok());
    }

    #[test]
    fn run_rules_reports_rule_name() {
        let rules: Vec<Box<dyn ValueRule>> = vec![Box::new(GoldenFloorRule)];
        let golden = CellValue::Number(10.0);
        let ctx = RuleContext {
            key: "spacing",
            golden: Some(&golden),
        };
        match run_rules(&rules, &ctx, &CellValue::Number(2.0)) {
            Err(RuleGridError::PolicyViolation { rule, .. }) => assert_eq!(rule, "golden_floor"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn name_validation() {
        assert!(NameValidator::validate("DDR_DQ[0]").is_ok());
        assert!(NameValidator::validate("PCIe.TX+").is_ok());
        assert!(NameValidator::validate("").is_err());
        assert!(NameValidator::validate("has space").is_err());
        assert!(NameValidator::validate(&"x".repeat(MAX_NAME_LENGTH + 1)).is_err());
    }
}
