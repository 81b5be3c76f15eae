pub mod alarm;
pub mod memo;

pub use alarm::{AlarmRow, AlarmUpdate, NewAlarm};
pub use memo::MemoRow;
