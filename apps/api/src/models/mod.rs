pub mod assessment;
pub mod learning;
pub mod skills;
