pub mod effort;
pub mod processed;
