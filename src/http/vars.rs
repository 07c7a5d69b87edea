//! Server-side include variables
//!
//! An SSI variable is a named view onto a value owned by the embedding
//! application. The registry only keeps a shared handle; the current value is
//! read every time a template is rendered, then scaled by an optional
//! multiplier and formatted with an optional printf-style format.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared handle to an application-owned value
#[derive(Clone)]
pub enum SsiValue {
    Int(Arc<AtomicI64>),
    UInt(Arc<AtomicU64>),
    Float(Arc<Mutex<f64>>),
    Bool(Arc<AtomicBool>),
    Text(Arc<RwLock<String>>),
    /// Value produced on demand
    Computed(Arc<dyn Fn() -> String + Send + Sync>),
}

impl fmt::Debug for SsiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsiValue::Int(v) => f.debug_tuple("Int").field(&v.load(Ordering::Relaxed)).finish(),
            SsiValue::UInt(v) => f.debug_tuple("UInt").field(&v.load(Ordering::Relaxed)).finish(),
            SsiValue::Float(v) => f.debug_tuple("Float").field(&*v.lock()).finish(),
            SsiValue::Bool(v) => f.debug_tuple("Bool").field(&v.load(Ordering::Relaxed)).finish(),
            SsiValue::Text(v) => f.debug_tuple("Text").field(&*v.read()).finish(),
            SsiValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A registered SSI variable
#[derive(Debug, Clone)]
pub struct SsiVariable {
    value: SsiValue,
    format: Option<String>,
    multiplier: Option<f64>,
}

/// Snapshot of a variable's value
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl SsiVariable {
    pub fn new(value: SsiValue) -> Self {
        SsiVariable {
            value,
            format: None,
            multiplier: None,
        }
    }

    /// Format the value with a printf-style format, e.g. `"%.2f V"`
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Scale numeric values before formatting
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Render the current value as text
    pub fn render(&self) -> String {
        let mut scalar = self.snapshot();

        if let Some(m) = self.multiplier {
            scalar = match scalar {
                Scalar::Int(v) => Scalar::Float(v as f64 * m),
                Scalar::UInt(v) => Scalar::Float(v as f64 * m),
                Scalar::Float(v) => Scalar::Float(v * m),
                text => text,
            };
        }

        match &self.format {
            Some(format) => format_printf(format, &scalar),
            None => scalar.to_string(),
        }
    }

    fn snapshot(&self) -> Scalar {
        match &self.value {
            SsiValue::Int(v) => Scalar::Int(v.load(Ordering::Relaxed)),
            SsiValue::UInt(v) => Scalar::UInt(v.load(Ordering::Relaxed)),
            SsiValue::Float(v) => Scalar::Float(*v.lock()),
            SsiValue::Bool(v) => Scalar::Int(v.load(Ordering::Relaxed) as i64),
            SsiValue::Text(v) => Scalar::Text(v.read().clone()),
            SsiValue::Computed(f) => Scalar::Text(f()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::UInt(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

impl Scalar {
    fn as_i128(&self) -> i128 {
        match self {
            Scalar::Int(v) => *v as i128,
            Scalar::UInt(v) => *v as i128,
            Scalar::Float(v) => v.round() as i128,
            Scalar::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Scalar::Int(v) => *v as f64,
            Scalar::UInt(v) => *v as f64,
            Scalar::Float(v) => *v,
            Scalar::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Default)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: usize,
    precision: Option<usize>,
}

/// Format `value` through a printf-style format string
///
/// Supported conversions: `d i u x X o f F e E s %`, with the `- + 0 space`
/// flags, a width and a precision. Every conversion renders the same value.
/// An unsupported conversion is copied to the output unchanged.
fn format_printf(format: &str, value: &Scalar) -> String {
    let mut out = String::with_capacity(format.len() + 16);
    let mut chars = format.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&(_, flag)) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = take_number(&mut chars).unwrap_or(0);
        if matches!(chars.peek(), Some(&(_, '.'))) {
            chars.next();
            spec.precision = Some(take_number(&mut chars).unwrap_or(0));
        }

        match chars.next() {
            Some((_, '%')) => out.push('%'),
            Some((_, conv)) if "diuxXofFeEs".contains(conv) => {
                out.push_str(&render_conversion(conv, &spec, value));
            }
            Some((end, conv)) => out.push_str(&format[start..end + conv.len_utf8()]),
            None => out.push_str(&format[start..]),
        }
    }

    out
}

fn take_number(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> Option<usize> {
    let mut number: Option<usize> = None;
    while let Some(&(_, c)) = chars.peek() {
        let Some(digit) = c.to_digit(10) else { break };
        number = Some(number.unwrap_or(0).saturating_mul(10).saturating_add(digit as usize));
        chars.next();
    }
    number
}

fn render_conversion(conv: char, spec: &Spec, value: &Scalar) -> String {
    let (negative, digits) = match conv {
        'd' | 'i' | 'u' => {
            let v = value.as_i128();
            (v < 0, v.unsigned_abs().to_string())
        }
        'x' => (false, format!("{:x}", value.as_i128() as u64)),
        'X' => (false, format!("{:X}", value.as_i128() as u64)),
        'o' => (false, format!("{:o}", value.as_i128() as u64)),
        'f' | 'F' => {
            let v = value.as_f64();
            let precision = spec.precision.unwrap_or(6);
            (v.is_sign_negative() && v != 0.0, format!("{:.*}", precision, v.abs()))
        }
        'e' | 'E' => {
            let v = value.as_f64();
            let precision = spec.precision.unwrap_or(6);
            let text = c_exponent(&format!("{:.*e}", precision, v.abs()));
            let text = if conv == 'E' { text.to_uppercase() } else { text };
            (v.is_sign_negative() && v != 0.0, text)
        }
        _ => {
            let mut text = value.to_string();
            if let Some(precision) = spec.precision {
                text = text.chars().take(precision).collect();
            }
            return pad(String::new(), text, spec.width, spec.left, false);
        }
    };

    let sign = if negative {
        "-"
    } else if spec.plus && matches!(conv, 'd' | 'i' | 'f' | 'F' | 'e' | 'E') {
        "+"
    } else if spec.space && matches!(conv, 'd' | 'i' | 'f' | 'F' | 'e' | 'E') {
        " "
    } else {
        ""
    };

    pad(sign.to_string(), digits, spec.width, spec.left, spec.zero)
}

/// Rewrite Rust's `1.5e3` exponent form into C's `1.5e+03`
fn c_exponent(rust: &str) -> String {
    match rust.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => rust.to_string(),
    }
}

fn pad(sign: String, body: String, width: usize, left: bool, zero: bool) -> String {
    let len = sign.chars().count() + body.chars().count();
    if len >= width {
        return sign + &body;
    }
    let fill = width - len;
    if left {
        format!("{}{}{}", sign, body, " ".repeat(fill))
    } else if zero {
        format!("{}{}{}", sign, "0".repeat(fill), body)
    } else {
        format!("{}{}{}", " ".repeat(fill), sign, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rendering() {
        let counter = Arc::new(AtomicU64::new(7));
        let var = SsiVariable::new(SsiValue::UInt(Arc::clone(&counter)));
        assert_eq!(var.render(), "7");

        counter.store(8, Ordering::Relaxed);
        assert_eq!(var.render(), "8");

        let flag = SsiVariable::new(SsiValue::Bool(Arc::new(AtomicBool::new(true))));
        assert_eq!(flag.render(), "1");

        let text = Arc::new(RwLock::new("idle".to_string()));
        let var = SsiVariable::new(SsiValue::Text(Arc::clone(&text)));
        *text.write() = "busy".to_string();
        assert_eq!(var.render(), "busy");
    }

    #[test]
    fn test_multiplier_and_format() {
        let millivolts = Arc::new(AtomicI64::new(3300));
        let var = SsiVariable::new(SsiValue::Int(millivolts))
            .with_multiplier(0.001)
            .with_format("%.2f V");
        assert_eq!(var.render(), "3.30 V");
    }

    #[test]
    fn test_computed_value() {
        let var = SsiVariable::new(SsiValue::Computed(Arc::new(|| "up".to_string())))
            .with_format("[%-4s]");
        assert_eq!(var.render(), "[up  ]");
    }

    #[test]
    fn test_printf_conversions() {
        assert_eq!(format_printf("%d", &Scalar::Int(-42)), "-42");
        assert_eq!(format_printf("%5d|", &Scalar::Int(42)), "   42|");
        assert_eq!(format_printf("%-5d|", &Scalar::Int(42)), "42   |");
        assert_eq!(format_printf("%05d", &Scalar::Int(-42)), "-0042");
        assert_eq!(format_printf("%+d", &Scalar::Int(5)), "+5");
        assert_eq!(format_printf("%x/%X/%o", &Scalar::UInt(255)), "ff/FF/377");
        assert_eq!(format_printf("%f", &Scalar::Float(1.5)), "1.500000");
        assert_eq!(format_printf("%.1f%%", &Scalar::Float(99.94)), "99.9%");
        assert_eq!(format_printf("%.2e", &Scalar::Float(1500.0)), "1.50e+03");
        assert_eq!(format_printf("%E", &Scalar::Float(0.00025)), "2.500000E-04");
        assert_eq!(format_printf("%d", &Scalar::Float(2.6)), "3");
        assert_eq!(format_printf("%.3s", &Scalar::Text("abcdef".into())), "abc");
        assert_eq!(format_printf("%q %d", &Scalar::Int(1)), "%q 1");
        assert_eq!(format_printf("tail %", &Scalar::Int(1)), "tail %");
    }
}
