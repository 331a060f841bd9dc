//! Luhn checksum validation for order numbers.
//!
//! Order numbers are decimal strings whose last digit is a Luhn check digit, credit-card style.
//! Everything that accepts an order number from the outside world must pass it through
//! [`is_valid_order_number`] first; the pipeline and the storage layer assume validated input.

/// Returns true if `number` consists only of ASCII digits and passes the Luhn checksum.
pub fn is_valid_order_number(number: &str) -> bool {
    !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()) && luhn_checksum_ok(number)
}

/// The Luhn mod-10 check over an all-digit string. Panics are avoided by skipping non-digit
/// bytes, but callers are expected to have checked the alphabet already.
pub fn luhn_checksum_ok(number: &str) -> bool {
    let sum: u32 = number
        .bytes()
        .rev()
        .filter(|b| b.is_ascii_digit())
        .map(u32::from)
        .map(|b| b - u32::from(b'0'))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_valid_numbers() {
        for number in ["5857088487", "2503317444", "3376308833", "1111111116", "79927398713"] {
            assert!(is_valid_order_number(number), "{number} should be valid");
        }
    }

    #[test]
    fn rejects_bad_checksums() {
        for number in ["5857088486", "2503317445", "1111111117", "1"] {
            assert!(!is_valid_order_number(number), "{number} should be invalid");
        }
    }

    #[test]
    fn rejects_non_digit_input() {
        for number in ["", "  ", "12a34", "-123", "12.34", "１２３"] {
            assert!(!is_valid_order_number(number), "{number:?} should be rejected");
        }
    }
}
