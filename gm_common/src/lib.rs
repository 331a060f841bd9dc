mod luhn;
mod points;
mod secret;

pub use luhn::{is_valid_order_number, luhn_checksum_ok};
pub use points::{Points, PointsConversionError};
pub use secret::Secret;
