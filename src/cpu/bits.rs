//! Bit-field extraction for 16-bit instruction words.
//!
//! Fields are addressed as `[hi:lo]`, inclusive, counting from bit 0 at the
//! least significant end, the same way the LC-3 instruction formats are drawn.

/// Extract bits `[hi:lo]` of `word`, right-justified.
///
/// # Panics
/// Panics if `lo > hi` or `hi > 15`. Every call site uses a constant field
/// from the instruction formats, so a bad range is a decoder bug.
#[inline]
pub fn extract(word: u16, hi: u8, lo: u8) -> u16 {
    assert!(
        lo <= hi && hi <= 15,
        "invalid bit field [{}:{}] of a 16-bit word",
        hi, lo
    );

    let width = u32::from(hi - lo + 1);
    let mask = if width == 16 { 0xFFFF } else { (1u16 << width) - 1 };
    (word >> lo) & mask
}

/// Extract bits `[hi:lo]` of `word` and sign-extend the field to 16 bits.
///
/// The top bit of the field is the sign. A full-width field is returned
/// unchanged.
#[inline]
pub fn extract_signed(word: u16, hi: u8, lo: u8) -> u16 {
    let field = extract(word, hi, lo);
    let width = u32::from(hi - lo + 1);

    if width < 16 && field & (1 << (width - 1)) != 0 {
        field | (0xFFFF << width)
    } else {
        field
    }
}

/// Test a single bit.
#[inline]
pub fn bit(word: u16, n: u8) -> bool {
    extract(word, n, n) == 1
}
