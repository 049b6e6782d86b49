/// Formats `value` in scientific notation with `precision` decimals and a
/// signed, at least two-digit exponent: `-7.24856738e-01`, `3.5e+02`.
pub fn format_scientific(value: f64, precision: usize) -> String {
    let formatted = format!("{:.*e}", precision, value);
    match formatted.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => formatted,
    }
}
