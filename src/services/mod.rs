pub mod channel;
pub mod distribution;
pub mod init;
pub mod retention;
pub mod secrets;
pub mod tasks;
pub mod transmission;
