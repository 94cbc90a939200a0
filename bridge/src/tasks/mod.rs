pub mod driver;
pub mod task;
