pub mod dram;
pub mod parallel;

pub use dram::Dram;
pub use parallel::ParallelMemory;
