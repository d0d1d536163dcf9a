//! Checked proportional arithmetic.
//!
//! Share conversions and reward splits all take the form `a * b / c`
//! rounded toward zero. The product is computed in 512 bits so that only
//! the final quotient can overflow.

use crate::{Amount, U512};

/// `a * b / c`, rounded down. `None` on division by zero or if the
/// quotient does not fit in 256 bits.
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> Option<Amount> {
    if c.is_zero() {
        return None;
    }
    let quotient = a.full_mul(b) / U512::from(c);
    Amount::try_from(quotient).ok()
}
