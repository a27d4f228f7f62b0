//! Trial data: records, loading, order joining and integrity checks
//!
//! ## Data Flow
//!
//! ```text
//! json_logs/*.json ──load_records──> TrialTable ──attach_trial_ids──> TrialTable (+trial_id)
//!        │                                                 ▲
//!        └──check_integrity──> IntegrityReport     OrderMapping <── other/order.xlsx
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use trial_analysis::trial::{attach_trial_ids, Condition, OrderMapping, TrialRecord, TrialTable};
//!
//! let mut table = TrialTable::new(vec![
//!     TrialRecord::new("1", Condition::new(0), 152.0, 830.5),
//!     TrialRecord::new("1", Condition::new(2), 131.4, 702.1),
//! ]);
//! let order = OrderMapping::from_rows(vec![(
//!     "01",
//!     vec![Some(Condition::new(2)), Some(Condition::new(0)), Some(Condition::new(1))],
//! )]);
//!
//! let report = attach_trial_ids(&mut table, &order);
//! assert!(report.missing_in_order.is_empty());
//! assert_eq!(table.records()[0].trial_index, Some(2));
//! ```

mod integrity;
pub mod loader;
mod order;
mod record;
pub mod synthetic;
mod table;

pub use integrity::{check_integrity, IntegrityIssue, IntegrityReport};
pub use loader::{load_records, LoadIssue, LoadReport};
pub use order::{attach_trial_ids, JoinReport, OrderMapping};
pub use record::{normalize_participant_id, Condition, Measure, TrialRecord, PARTICIPANT_ID_WIDTH};
pub use table::{trial_schema, TrialTable, WideTable};
