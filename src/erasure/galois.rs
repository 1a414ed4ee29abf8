//! 8-bit Galois field arithmetic
//!
//! GF(2^8) generated by the polynomial 29 (x^8 + x^4 + x^3 + x^2 + 1).
//! Addition and subtraction are XOR. Multiplication and division go
//! through log/exp tables that are computed at compile time and never
//! change afterwards.

use crate::error::{Error, Result};

/// Number of elements in the field
pub const FIELD_SIZE: usize = 256;

/// Polynomial used to generate the log table
pub const GENERATING_POLYNOMIAL: usize = 29;

/// Length of the exp table: doubled so the sum of two logs indexes it directly
const EXP_TABLE_SIZE: usize = FIELD_SIZE * 2 - 2;

const LOG: [u8; FIELD_SIZE] = generate_log_table(GENERATING_POLYNOMIAL);

/// Element -> logarithm. The entry for 0 is meaningless.
static LOG_TABLE: [u8; FIELD_SIZE] = LOG;

/// Logarithm -> element, repeated once
static EXP_TABLE: [u8; EXP_TABLE_SIZE] = generate_exp_table(&LOG);

const fn generate_log_table(polynomial: usize) -> [u8; FIELD_SIZE] {
    let mut result = [0u8; FIELD_SIZE];
    let mut b = 1usize;
    let mut log = 0usize;
    while log < FIELD_SIZE - 1 {
        result[b] = log as u8;
        b <<= 1;
        if b >= FIELD_SIZE {
            b = (b - FIELD_SIZE) ^ polynomial;
        }
        log += 1;
    }
    result
}

const fn generate_exp_table(log_table: &[u8; FIELD_SIZE]) -> [u8; EXP_TABLE_SIZE] {
    let mut result = [0u8; EXP_TABLE_SIZE];
    let mut i = 1usize;
    while i < FIELD_SIZE {
        let log = log_table[i] as usize;
        result[log] = i as u8;
        result[log + FIELD_SIZE - 1] = i as u8;
        i += 1;
    }
    result
}

/// Check whether `polynomial` generates a full field, i.e. walking the
/// powers of 2 visits every non-zero element exactly once.
pub fn is_generating_polynomial(polynomial: usize) -> bool {
    let mut seen = [false; FIELD_SIZE];
    let mut b = 1usize;
    for _ in 0..FIELD_SIZE - 1 {
        if b == 0 || b >= FIELD_SIZE || seen[b] {
            return false;
        }
        seen[b] = true;
        b <<= 1;
        if b >= FIELD_SIZE {
            b = (b - FIELD_SIZE) ^ polynomial;
        }
    }
    true
}

/// a + b
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// a - b (identical to addition in characteristic 2)
#[inline]
pub fn subtract(a: u8, b: u8) -> u8 {
    a ^ b
}

/// a * b
#[inline]
pub fn multiply(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    EXP_TABLE[LOG_TABLE[a as usize] as usize + LOG_TABLE[b as usize] as usize]
}

/// a / b
///
/// # Errors
/// Returns `Error::DivideByZero` when `b == 0`
pub fn divide(a: u8, b: u8) -> Result<u8> {
    if b == 0 {
        return Err(Error::DivideByZero);
    }
    if a == 0 {
        return Ok(0);
    }
    let mut log = LOG_TABLE[a as usize] as isize - LOG_TABLE[b as usize] as isize;
    if log < 0 {
        log += (FIELD_SIZE - 1) as isize;
    }
    Ok(EXP_TABLE[log as usize])
}

/// a raised to the power n
pub fn exp(a: u8, n: usize) -> u8 {
    if n == 0 {
        return 1;
    }
    if a == 0 {
        return 0;
    }
    let log = (LOG_TABLE[a as usize] as usize * n) % (FIELD_SIZE - 1);
    EXP_TABLE[log]
}
