pub mod emotion;
pub mod prediction;
