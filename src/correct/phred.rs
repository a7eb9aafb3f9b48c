//! Phred quality model: symbol <-> base-call error probability.

/// ASCII offset of the phred encoding.
const PHRED_OFFSET: u8 = 33;

/// Highest representable quality score ('~' after the offset).
const PHRED_MAX: f64 = 93.0;

/// Error probability encoded by a phred quality symbol.
pub fn phred_err(symbol: u8) -> f64 {
    let q = symbol.saturating_sub(PHRED_OFFSET) as f64;
    10f64.powf(-q / 10.0)
}

/// Phred quality symbol encoding an error probability, clamped to the
/// printable range.
pub fn phred_symbol(err: f64) -> u8 {
    if err <= 0.0 {
        return PHRED_OFFSET + PHRED_MAX as u8;
    }

    let q = (-10.0 * err.log10()).clamp(0.0, PHRED_MAX);
    PHRED_OFFSET + q.round() as u8
}
