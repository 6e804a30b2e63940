//! 诊断接口 handlers（只读）

pub mod connections;
pub mod health;
pub mod partitions;

pub use connections::*;
pub use health::*;
pub use partitions::*;
