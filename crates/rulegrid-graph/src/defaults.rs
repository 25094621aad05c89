use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::debug;

use rulegrid_core::{run_rules, CellValue, ConstraintType, Result, RuleContext, ValueRule};

/// Default constraint values (DefCon) for one constraint type.
///
/// Golden values are the read-only reference; editable values override them
/// and are checked against the configured [`ValueRule`]s before being stored.
pub struct DefaultConstraintSet {
    constraint_type: ConstraintType,
    golden: BTreeMap<String, CellValue>,
    editable: BTreeMap<String, CellValue>,
    rules: Vec<Box<dyn ValueRule>>,
}

impl fmt::Debug for DefaultConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultConstraintSet")
            .field("constraint_type", &self.constraint_type)
            .field("golden", &self.golden)
            .field("editable", &self.editable)
            .field(
                "rules",
                &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl DefaultConstraintSet {
    pub fn new(constraint_type: ConstraintType) -> Self {
        Self {
            constraint_type,
            golden: BTreeMap::new(),
            editable: BTreeMap::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: impl ValueRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn add_rule(&mut self, rule: Box<dyn ValueRule>) {
        self.rules.push(rule);
    }

    pub fn constraint_type(&self) -> ConstraintType {
        self.constraint_type
    }

    pub fn set_golden(&mut self, key: impl Into<String>, value: CellValue) {
        self.golden.insert(key.into(), value);
    }

    pub fn set_editable(&mut self, key: &str, value: CellValue) -> Result<()> {
        let ctx = RuleContext {
            key,
            golden: self.golden.get(key),
        };
        run_rules(&self.rules, &ctx, &value)?;
        debug!("{} default '{}' set to {}", self.constraint_type, key, value);
        self.editable.insert(key.to_string(), value);
        Ok(())
    }

    /// Drop the editable override so `key` resolves to its golden value again.
    pub fn reset_editable(&mut self, key: &str) -> Option<CellValue> {
        self.editable.remove(key)
    }

    pub fn golden(&self, key: &str) -> Option<&CellValue> {
        self.golden.get(key)
    }

    pub fn editable(&self, key: &str) -> Option<&CellValue> {
        self.editable.get(key)
    }

    /// Editable value if set, else golden.
    pub fn resolve(&self, key: &str) -> Option<&CellValue> {
        self.editable.get(key).or_else(|| self.golden.get(key))
    }

    pub fn keys(&self) -> BTreeSet<&str> {
        self.golden
            .keys()
            .chain(self.editable.keys())
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulegrid_core::{GoldenFloorRule, RuleGridError};

    #[test]
    fn editable_overrides_golden() {
        let mut set = DefaultConstraintSet::new(ConstraintType::Physical);
        set.set_golden("min_width", CellValue::Number(0.1));
        assert_eq!(set.resolve("min_width"), Some(&CellValue::Number(0.1)));

        set.set_editable("min_width", CellValue::Number(0.05)).unwrap();
        assert_eq!(set.resolve("min_width"), Some(&CellValue::Number(0.05)));

        set.reset_editable("min_width");
        assert_eq!(set.resolve("min_width"), Some(&CellValue::Number(0.1)));
        assert!(set.resolve("max_length").is_none());
    }

    #[test]
    fn golden_floor_rejects_lower_values() {
        let mut set =
            DefaultConstraintSet::new(ConstraintType::Clearance).with_rule(GoldenFloorRule);
        set.set_golden("trace_to_trace", CellValue::Number(0.2));

        let err = set
            .set_editable("trace_to_trace", CellValue::Number(0.1))
            .unwrap_err();
        assert!(matches!(err, RuleGridError::PolicyViolation { ref rule, .. } if rule == "golden_floor"));
        assert!(set.editable("trace_to_trace").is_none());

        set.set_editable("trace_to_trace", CellValue::Number(0.3))
            .unwrap();
        set.set_editable("via_to_via", CellValue::Number(0.01))
            .unwrap();
        assert_eq!(set.keys().len(), 2);
    }
}
