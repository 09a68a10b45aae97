pub mod fraud;
pub mod ports;
pub mod transaction;
pub mod wallet;
