pub mod completion;
pub mod handshake;
pub mod travel;
