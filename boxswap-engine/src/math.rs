//! Fixed-point arithmetic with an 18-decimal scale.
//!
//! Every product is formed in 256 bits and every division truncates toward
//! zero. Results narrowed back to `u128` fail with `ArithmeticFault` instead
//! of wrapping.

use ethnum::U256;

use crate::error::{EngineError, EngineResult};

pub use boxswap_domain::SCALE;

/// `SCALE` as a wide integer.
pub const WIDE_SCALE: U256 = U256::new(SCALE);

/// Widen a `u128` operand.
#[inline]
pub fn wide(value: u128) -> U256 {
    U256::new(value)
}

/// Narrow a wide result back to `u128`.
pub fn narrow(value: U256, context: &str) -> EngineResult<u128> {
    if value > U256::new(u128::MAX) {
        return Err(EngineError::fault(format!("{}: result exceeds 128 bits", context)));
    }
    Ok(value.as_u128())
}

/// `a + b` in 256 bits.
pub fn add(a: U256, b: U256, context: &str) -> EngineResult<U256> {
    a.checked_add(b)
        .ok_or_else(|| EngineError::fault(format!("{}: addition overflow", context)))
}

/// `a - b` in 256 bits, failing instead of going negative.
pub fn sub(a: U256, b: U256, context: &str) -> EngineResult<U256> {
    a.checked_sub(b)
        .ok_or_else(|| EngineError::fault(format!("{}: subtraction underflow", context)))
}

/// `a * b` in 256 bits.
pub fn mul(a: U256, b: U256, context: &str) -> EngineResult<U256> {
    a.checked_mul(b)
        .ok_or_else(|| EngineError::fault(format!("{}: multiplication overflow", context)))
}

/// `floor(a * b / c)`.
pub fn mul_div(a: U256, b: U256, c: U256, context: &str) -> EngineResult<U256> {
    if c == U256::ZERO {
        return Err(EngineError::fault(format!("{}: division by zero", context)));
    }
    Ok(mul(a, b, context)? / c)
}

/// `ceil(a * b / c)`.
pub fn mul_div_up(a: U256, b: U256, c: U256, context: &str) -> EngineResult<U256> {
    if c == U256::ZERO {
        return Err(EngineError::fault(format!("{}: division by zero", context)));
    }
    let product = mul(a, b, context)?;
    let quotient = product / c;
    if product % c == U256::ZERO {
        Ok(quotient)
    } else {
        add(quotient, U256::ONE, context)
    }
}

/// `floor(a * b / SCALE)` on narrow operands.
///
/// # Examples
/// ```
/// # use boxswap_engine::math::{mul_scaled, SCALE};
/// let half = SCALE / 2;
/// assert_eq!(mul_scaled(300, half).unwrap(), 150);
/// ```
pub fn mul_scaled(a: u128, b: u128) -> EngineResult<u128> {
    narrow(mul_div(wide(a), wide(b), WIDE_SCALE, "mul_scaled")?, "mul_scaled")
}

/// `floor(a * SCALE / b)` on narrow operands.
pub fn div_scaled(a: u128, b: u128) -> EngineResult<u128> {
    narrow(mul_div(wide(a), WIDE_SCALE, wide(b), "div_scaled")?, "div_scaled")
}

/// Integer square root by Newton's method, rounded down.
///
/// The iteration count is bounded by the bit width; each step at least
/// halves the distance to the root once above it.
pub fn sqrt(value: U256) -> U256 {
    if value < U256::new(2) {
        return value;
    }
    let mut root = value;
    // ceil(value / 2): a larger seed stalls at 2 for value 2
    let mut next = (value >> 1) + (value & U256::ONE);
    while next < root {
        root = next;
        next = (value / next + next) >> 1;
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_scaled_truncates() {
        // 1.5 * 0.333... truncates
        let third = SCALE / 3;
        assert_eq!(mul_scaled(3 * SCALE / 2, third).unwrap(), 499_999_999_999_999_999);
    }

    #[test]
    fn test_div_scaled() {
        assert_eq!(div_scaled(100_000, 200_000).unwrap(), SCALE / 2);
        assert!(div_scaled(1, 0).is_err());
    }

    #[test]
    fn test_wide_intermediate_does_not_overflow() {
        // u128::MAX * SCALE overflows u128 but not U256
        let result = mul_div(wide(u128::MAX), WIDE_SCALE, WIDE_SCALE, "test").unwrap();
        assert_eq!(narrow(result, "test").unwrap(), u128::MAX);
    }

    #[test]
    fn test_narrow_rejects_oversized() {
        let too_big = wide(u128::MAX) + U256::ONE;
        assert!(matches!(
            narrow(too_big, "test"),
            Err(EngineError::ArithmeticFault(_))
        ));
    }

    #[test]
    fn test_mul_div_up() {
        assert_eq!(mul_div_up(wide(10), wide(1), wide(3), "t").unwrap(), wide(4));
        assert_eq!(mul_div_up(wide(9), wide(1), wide(3), "t").unwrap(), wide(3));
    }

    #[test]
    fn test_sub_underflow_is_fault() {
        assert!(sub(wide(1), wide(2), "reserve").is_err());
        assert_eq!(sub(wide(5), wide(2), "reserve").unwrap(), wide(3));
    }

    #[test]
    fn test_sqrt() {
        assert_eq!(sqrt(U256::ZERO), U256::ZERO);
        assert_eq!(sqrt(U256::ONE), U256::ONE);
        assert_eq!(sqrt(wide(2)), U256::ONE);
        assert_eq!(sqrt(wide(3)), U256::ONE);
        assert_eq!(sqrt(wide(4)), wide(2));
        assert_eq!(sqrt(wide(6)), wide(2));
        assert_eq!(sqrt(wide(8)), wide(2));
        assert_eq!(sqrt(wide(10)), wide(3));
        assert_eq!(sqrt(wide(15)), wide(3));
        assert_eq!(sqrt(wide(16)), wide(4));
        assert_eq!(sqrt(wide(SCALE) * wide(SCALE)), wide(SCALE));

        for n in 0u128..200 {
            let root = sqrt(wide(n)).as_u128();
            assert!(root * root <= n && (root + 1) * (root + 1) > n, "sqrt({})", n);
        }

        let max_root = sqrt(U256::MAX);
        assert_eq!(max_root, wide(u128::MAX));
    }
}
