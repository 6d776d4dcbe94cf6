pub mod attendance_codes;
pub mod outbox_events;
