pub mod banshare;
pub mod channel;
pub mod event;
pub mod message;
