pub mod download;
pub mod separation;
pub mod system;
