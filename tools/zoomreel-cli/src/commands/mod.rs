pub mod check;
pub mod export;
pub mod graph;
pub mod init;
pub mod validate;
