pub mod diff;
pub mod generate;
pub mod status;
pub mod sync;
