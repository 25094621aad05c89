//! Rule-area engine: the class-to-class relation matrix, linkage groups,
//! group-to-group expansion and default constraint values.

pub mod defaults;
pub mod expansion;
pub mod linkage;
pub mod matrix;
pub mod rule_area;

pub use defaults::DefaultConstraintSet;
pub use expansion::{ExpansionPlan, ExpansionReport, ExpansionRoute, GroupExpansionEngine};
pub use linkage::{CellAccess, LinkageGraph};
pub use matrix::{Cell, MatrixRow, RelationMatrixStore, RowFilter};
pub use rule_area::{CommandOutcome, MatrixCommand, RuleArea};
