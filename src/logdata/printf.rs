// src/logdata/printf.rs
//
// Positional %-substitution for compiled format strings. The table
// generator has already rewritten C formats into the printf subset below
// (length modifiers stripped, %p rewritten to 0x%08x), so this only needs
// the classic conversions with flags, width, and precision.

use crate::logdata::parsers::{hex_spaced, Arg};

/// Why a format application failed. All failures route to the same
/// "(FORMATTING FAILED)" fallback; the variants exist for tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatError {
    /// More conversions than parsed values.
    MissingArgument,
    /// Parsed values left over after the last conversion.
    ExtraArguments,
    /// Value type does not fit the conversion.
    TypeMismatch(char),
    /// Unparseable conversion specification.
    BadSpec,
}

#[derive(Default)]
struct Spec {
    minus: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alt: bool,
    width: usize,
    prec: Option<usize>,
}

/// Apply `fmt` to `args` with positional substitution.
pub fn format_message(fmt: &str, args: &[Arg]) -> Result<String, FormatError> {
    let chars: Vec<char> = fmt.chars().collect();
    let mut out = String::with_capacity(fmt.len() + 16);
    let mut i = 0usize;
    let mut next_arg = 0usize;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        if i >= chars.len() {
            return Err(FormatError::BadSpec);
        }
        if chars[i] == '%' {
            out.push('%');
            i += 1;
            continue;
        }

        let mut spec = Spec::default();
        while i < chars.len() {
            match chars[i] {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '0' => spec.zero = true,
                '#' => spec.alt = true,
                _ => break,
            }
            i += 1;
        }
        while i < chars.len() && chars[i].is_ascii_digit() {
            spec.width = spec.width * 10 + chars[i].to_digit(10).unwrap() as usize;
            i += 1;
        }
        if i < chars.len() && chars[i] == '.' {
            i += 1;
            let mut prec = 0usize;
            while i < chars.len() && chars[i].is_ascii_digit() {
                prec = prec * 10 + chars[i].to_digit(10).unwrap() as usize;
                i += 1;
            }
            spec.prec = Some(prec);
        }
        if i >= chars.len() {
            return Err(FormatError::BadSpec);
        }

        let conv = chars[i];
        i += 1;
        let arg = args.get(next_arg).ok_or(FormatError::MissingArgument)?;
        next_arg += 1;
        out.push_str(&convert(conv, &spec, arg)?);
    }

    if next_arg < args.len() {
        return Err(FormatError::ExtraArguments);
    }
    Ok(out)
}

// ============================================================================
// Conversions
// ============================================================================

fn convert(conv: char, spec: &Spec, arg: &Arg) -> Result<String, FormatError> {
    match conv {
        'd' | 'i' | 'u' => int_conv(spec, arg, 10, false, conv),
        'o' => int_conv(spec, arg, 8, false, conv),
        'x' => int_conv(spec, arg, 16, false, conv),
        'X' => int_conv(spec, arg, 16, true, conv),
        'c' => char_conv(spec, arg),
        'f' | 'F' => float_conv(spec, arg, conv, fixed_body),
        'e' | 'E' => float_conv(spec, arg, conv, exp_body),
        'g' | 'G' => float_conv(spec, arg, conv, general_body),
        's' => Ok(pad_str(&display(arg), spec)),
        _ => Err(FormatError::BadSpec),
    }
}

fn int_value(arg: &Arg) -> Option<i128> {
    match arg {
        Arg::Int(v) => Some(*v as i128),
        Arg::Uint(v) => Some(*v as i128),
        _ => None,
    }
}

fn float_value(arg: &Arg) -> Option<f64> {
    match arg {
        Arg::Float(v) => Some(*v),
        Arg::Int(v) => Some(*v as f64),
        Arg::Uint(v) => Some(*v as f64),
        _ => None,
    }
}

fn display(arg: &Arg) -> String {
    match arg {
        Arg::Int(v) => v.to_string(),
        Arg::Uint(v) => v.to_string(),
        Arg::Float(v) => v.to_string(),
        Arg::Str(s) => s.clone(),
        Arg::Bytes(b) => hex_spaced(b),
    }
}

fn int_conv(
    spec: &Spec,
    arg: &Arg,
    base: u32,
    upper: bool,
    conv: char,
) -> Result<String, FormatError> {
    let v = int_value(arg).ok_or(FormatError::TypeMismatch(conv))?;
    let mag = v.unsigned_abs();

    let mut digits = match base {
        8 => format!("{:o}", mag),
        16 if upper => format!("{:X}", mag),
        16 => format!("{:x}", mag),
        _ => mag.to_string(),
    };
    if let Some(prec) = spec.prec {
        while digits.len() < prec {
            digits.insert(0, '0');
        }
    }

    let mut prefix = String::new();
    if v < 0 {
        prefix.push('-');
    } else if spec.plus {
        prefix.push('+');
    } else if spec.space {
        prefix.push(' ');
    }
    if spec.alt && mag != 0 {
        match base {
            8 => prefix.push_str("0o"),
            16 => prefix.push_str(if upper { "0X" } else { "0x" }),
            _ => {}
        }
    }

    Ok(pad_numeric(prefix, digits, spec))
}

fn char_conv(spec: &Spec, arg: &Arg) -> Result<String, FormatError> {
    let c = match arg {
        Arg::Int(v) => u32::try_from(*v).ok().and_then(char::from_u32),
        Arg::Uint(v) => u32::try_from(*v).ok().and_then(char::from_u32),
        Arg::Str(s) if s.chars().count() == 1 => s.chars().next(),
        _ => None,
    }
    .ok_or(FormatError::TypeMismatch('c'))?;
    Ok(pad_str(&c.to_string(), spec))
}

fn float_conv(
    spec: &Spec,
    arg: &Arg,
    conv: char,
    body: fn(f64, usize) -> String,
) -> Result<String, FormatError> {
    let v = float_value(arg).ok_or(FormatError::TypeMismatch(conv))?;
    if !v.is_finite() {
        let mut text = if v.is_nan() {
            "nan".to_string()
        } else if v > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
        if conv.is_ascii_uppercase() {
            text = text.to_uppercase();
        }
        return Ok(pad_str(&text, spec));
    }

    let prec = spec.prec.unwrap_or(6);
    let rendered = body(v.abs(), prec);
    let rendered = if conv.is_ascii_uppercase() {
        rendered.to_uppercase()
    } else {
        rendered
    };

    let mut prefix = String::new();
    if v.is_sign_negative() && v != 0.0 {
        prefix.push('-');
    } else if spec.plus {
        prefix.push('+');
    } else if spec.space {
        prefix.push(' ');
    }
    Ok(pad_numeric(prefix, rendered, spec))
}

fn fixed_body(v: f64, prec: usize) -> String {
    format!("{:.*}", prec, v)
}

fn exp_body(v: f64, prec: usize) -> String {
    // Rust renders "1.234e3"; printf wants a signed two-digit exponent.
    let s = format!("{:.*e}", prec, v);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            format!("{}e{}{:02}", mantissa, if exp < 0 { '-' } else { '+' }, exp.abs())
        }
        None => s,
    }
}

fn general_body(v: f64, prec: usize) -> String {
    let prec = prec.max(1);
    if v == 0.0 {
        return "0".to_string();
    }
    let exp = v.log10().floor() as i32;
    if exp < -4 || exp >= prec as i32 {
        let s = exp_body(v, prec - 1);
        match s.split_once('e') {
            Some((mantissa, exp_part)) => format!("{}e{}", trim_zeros(mantissa), exp_part),
            None => s,
        }
    } else {
        let decimals = (prec as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, v))
    }
}

fn trim_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

// ============================================================================
// Padding
// ============================================================================

/// Width padding for numeric output: zero-fill goes between the sign/prefix
/// and the digits; space-fill goes outside.
fn pad_numeric(prefix: String, body: String, spec: &Spec) -> String {
    let len = prefix.len() + body.chars().count();
    if len >= spec.width {
        return prefix + &body;
    }
    let fill = spec.width - len;
    if spec.minus {
        let mut s = prefix + &body;
        s.extend(std::iter::repeat(' ').take(fill));
        s
    } else if spec.zero && spec.prec.is_none() {
        format!("{}{}{}", prefix, "0".repeat(fill), body)
    } else {
        format!("{}{}{}", " ".repeat(fill), prefix, body)
    }
}

fn pad_str(text: &str, spec: &Spec) -> String {
    let mut text = text.to_string();
    if let Some(prec) = spec.prec {
        text = text.chars().take(prec).collect();
    }
    let len = text.chars().count();
    if len >= spec.width {
        return text;
    }
    let fill = spec.width - len;
    if spec.minus {
        text.extend(std::iter::repeat(' ').take(fill));
        text
    } else {
        format!("{}{}", " ".repeat(fill), text)
    }
}

// ============================================================================
// Tests
// ============================================================================
