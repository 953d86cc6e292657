pub mod database;
pub mod media;
pub mod network;
pub mod remote;
pub mod sync;
