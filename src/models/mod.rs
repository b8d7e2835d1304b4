pub mod address;
pub mod assignment;
pub mod order;
pub mod shipper;
pub mod zone;
