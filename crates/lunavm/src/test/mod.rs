// Test module organization
pub mod support;

pub mod test_calls;
pub mod test_stdlib;
