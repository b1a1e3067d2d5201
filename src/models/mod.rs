pub mod barber;
pub mod booking;
pub mod dispatch;
pub mod handshake;
pub mod settlement;
pub mod travel;
