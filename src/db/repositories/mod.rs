mod alarms;
mod memos;
