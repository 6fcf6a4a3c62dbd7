pub mod sniffer;
pub mod validation;
