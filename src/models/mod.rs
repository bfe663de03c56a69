pub mod apple;
pub mod common;
pub mod subscription;
