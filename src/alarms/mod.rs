pub mod evaluator;
pub mod projections;
pub mod record;
pub mod store;

pub use evaluator::{due_alarms, Evaluation, FiredCache};
pub use projections::{regular_alarms_for, upcoming_one_off};
pub use record::{AlarmRecord, DataQualityWarning, Recurrence, RecordError, WeekdaySet};
pub use store::AlarmStore;
