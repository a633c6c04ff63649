pub mod atmosphere;
pub mod geodesy;
pub mod units;
