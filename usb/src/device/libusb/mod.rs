pub mod cdc;
pub mod device;
