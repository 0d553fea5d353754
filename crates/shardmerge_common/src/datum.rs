use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{MergeError, MergeResult};
use crate::types::DataType;

/// A single scalar value read from a shard cursor.
/// Small enum, no heap allocation for fixed-size types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    /// Fixed-point decimal: mantissa × 10^(-scale).
    /// e.g. Decimal(12345, 2) = 123.45
    Decimal(i128, u8),
    Text(String),
    Timestamp(i64), // microseconds since Unix epoch
    Date(i32),      // days since Unix epoch (1970-01-01)
    Bytea(Vec<u8>),
}

impl Datum {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Datum::Null => None,
            Datum::Boolean(_) => Some(DataType::Boolean),
            Datum::Int32(_) => Some(DataType::Int32),
            Datum::Int64(_) => Some(DataType::Int64),
            Datum::Float64(_) => Some(DataType::Float64),
            Datum::Decimal(_, _) => Some(DataType::Decimal),
            Datum::Text(_) => Some(DataType::Text),
            Datum::Timestamp(_) => Some(DataType::Timestamp),
            Datum::Date(_) => Some(DataType::Date),
            Datum::Bytea(_) => Some(DataType::Bytea),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.data_type().map(|t| t.name()).unwrap_or("null")
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int32(v) => Some(*v as i64),
            Datum::Int64(v) => Some(*v),
            Datum::Decimal(m, s) => {
                let (m, s) = decimal_trim(*m, *s);
                if s == 0 {
                    i64::try_from(m).ok()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int32(v) => Some(*v as f64),
            Datum::Int64(v) => Some(*v as f64),
            Datum::Float64(v) => Some(*v),
            Datum::Decimal(m, s) => Some(*m as f64 / 10f64.powi(*s as i32)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to add two datums (SUM / COUNT accumulation).
    pub fn add(&self, other: &Datum) -> Option<Datum> {
        match (self, other) {
            (Datum::Int32(a), Datum::Int32(b)) => Some(Datum::Int64(*a as i64 + *b as i64)),
            (Datum::Int64(a), Datum::Int64(b)) => a.checked_add(*b).map(Datum::Int64),
            (Datum::Int64(a), Datum::Int32(b)) => a.checked_add(*b as i64).map(Datum::Int64),
            (Datum::Int32(a), Datum::Int64(b)) => (*a as i64).checked_add(*b).map(Datum::Int64),
            (Datum::Float64(a), Datum::Float64(b)) => Some(Datum::Float64(a + b)),
            (Datum::Float64(a), Datum::Int64(b)) => Some(Datum::Float64(a + *b as f64)),
            (Datum::Float64(a), Datum::Int32(b)) => Some(Datum::Float64(a + *b as f64)),
            (Datum::Int64(a), Datum::Float64(b)) => Some(Datum::Float64(*a as f64 + b)),
            (Datum::Int32(a), Datum::Float64(b)) => Some(Datum::Float64(*a as f64 + b)),
            (Datum::Decimal(a, sa), Datum::Decimal(b, sb)) => decimal_add(*a, *sa, *b, *sb),
            (Datum::Decimal(a, sa), Datum::Int64(b)) => decimal_add(*a, *sa, *b as i128, 0),
            (Datum::Decimal(a, sa), Datum::Int32(b)) => decimal_add(*a, *sa, *b as i128, 0),
            (Datum::Int64(a), Datum::Decimal(b, sb)) => decimal_add(*a as i128, 0, *b, *sb),
            (Datum::Int32(a), Datum::Decimal(b, sb)) => decimal_add(*a as i128, 0, *b, *sb),
            (Datum::Decimal(m, s), Datum::Float64(b)) | (Datum::Float64(b), Datum::Decimal(m, s)) => {
                Some(Datum::Float64(*m as f64 / 10f64.powi(*s as i32) + b))
            }
            _ => None,
        }
    }

    /// Divide an accumulated sum by an accumulated count (AVG finalisation).
    /// Decimal sums stay decimal with at least four fractional digits; every
    /// other numeric sum becomes Float64. Returns `None` for a zero count.
    pub fn div_count(&self, count: &Datum) -> Option<Datum> {
        let divisor = count.as_f64()?;
        if divisor == 0.0 {
            return None;
        }
        match (self, count.as_i64()) {
            (Datum::Decimal(m, s), Some(c)) => decimal_div(*m, *s, c as i128, 0, (*s).max(4)),
            _ => self.as_f64().map(|sum| Datum::Float64(sum / divisor)),
        }
    }

    /// BIT_XOR accumulation over integers.
    pub fn bit_xor(&self, other: &Datum) -> Option<Datum> {
        Some(Datum::Int64(self.as_i64()? ^ other.as_i64()?))
    }

    /// Convert this value into the requested kind. NULL converts to NULL.
    pub fn coerce_to(self, target: DataType) -> MergeResult<Datum> {
        if self.is_null() || self.data_type() == Some(target) {
            return Ok(self);
        }
        let got = self.type_name();
        let coerced = match (target, self) {
            (DataType::Boolean, Datum::Int32(v)) => Some(Datum::Boolean(v != 0)),
            (DataType::Boolean, Datum::Int64(v)) => Some(Datum::Boolean(v != 0)),
            (DataType::Boolean, Datum::Text(s)) => parse_bool(&s).map(Datum::Boolean),
            (DataType::Int32, Datum::Int64(v)) => i32::try_from(v).ok().map(Datum::Int32),
            (DataType::Int32, Datum::Boolean(b)) => Some(Datum::Int32(b as i32)),
            (DataType::Int32, d @ Datum::Decimal(_, _)) => {
                d.as_i64().and_then(|v| i32::try_from(v).ok()).map(Datum::Int32)
            }
            (DataType::Int32, Datum::Text(s)) => s.trim().parse().ok().map(Datum::Int32),
            (DataType::Int32, Datum::Float64(v)) if v.fract() == 0.0 && v.abs() <= i32::MAX as f64 => {
                Some(Datum::Int32(v as i32))
            }
            (DataType::Int64, Datum::Float64(v)) if v.fract() == 0.0 && v.abs() < 9.2e18 => {
                Some(Datum::Int64(v as i64))
            }
            (DataType::Int64, Datum::Int32(v)) => Some(Datum::Int64(v as i64)),
            (DataType::Int64, Datum::Boolean(b)) => Some(Datum::Int64(b as i64)),
            (DataType::Int64, d @ Datum::Decimal(_, _)) => d.as_i64().map(Datum::Int64),
            (DataType::Int64, Datum::Timestamp(us)) => Some(Datum::Int64(us)),
            (DataType::Int64, Datum::Text(s)) => s.trim().parse().ok().map(Datum::Int64),
            (DataType::Float64, Datum::Text(s)) => s.trim().parse().ok().map(Datum::Float64),
            (DataType::Float64, d) => d.as_f64().map(Datum::Float64),
            (DataType::Decimal, Datum::Int32(v)) => Some(Datum::Decimal(v as i128, 0)),
            (DataType::Decimal, Datum::Int64(v)) => Some(Datum::Decimal(v as i128, 0)),
            (DataType::Decimal, Datum::Float64(v)) => Datum::parse_decimal(&v.to_string()),
            (DataType::Decimal, Datum::Text(s)) => Datum::parse_decimal(&s),
            (DataType::Text, d) => Some(Datum::Text(d.to_string())),
            (DataType::Timestamp, Datum::Int64(us)) => Some(Datum::Timestamp(us)),
            (DataType::Date, Datum::Int32(days)) => Some(Datum::Date(days)),
            (DataType::Bytea, Datum::Text(s)) => Some(Datum::Bytea(s.into_bytes())),
            _ => None,
        };
        coerced.ok_or_else(|| MergeError::TypeMismatch {
            expected: target.to_string(),
            got: got.to_string(),
        })
    }

    /// Create a Decimal from a string like "123.45" or "-0.001".
    pub fn parse_decimal(s: &str) -> Option<Datum> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let (int_part, frac_part) = if let Some(dot_pos) = s.find('.') {
            (&s[..dot_pos], &s[dot_pos + 1..])
        } else {
            (s, "")
        };
        let scale = u8::try_from(frac_part.len()).ok()?;
        let combined = format!("{}{}", int_part, frac_part);
        let mantissa: i128 = combined.parse().ok()?;
        Some(Datum::Decimal(mantissa, scale))
    }

    /// Total order over non-null values used by ORDER BY and MAX/MIN.
    /// Text on a case-insensitive column ignores ASCII case.
    pub fn cmp_values(&self, other: &Datum, case_sensitive: bool) -> Ordering {
        if !case_sensitive {
            if let (Datum::Text(a), Datum::Text(b)) = (self, other) {
                return cmp_ignore_ascii_case(a, b);
            }
        }
        self.cmp(other)
    }

    /// Append a deterministic binary encoding of this value to `key`.
    ///
    /// Numerically equal integers and decimals of any width encode the
    /// same, so group keys agree across shards that report different widths.
    pub fn encode_key(&self, case_sensitive: bool, key: &mut Vec<u8>) {
        match self {
            Datum::Null => key.push(0),
            Datum::Boolean(b) => {
                key.push(1);
                key.push(*b as u8);
            }
            Datum::Int32(_) | Datum::Int64(_) => {
                key.push(2);
                key.extend_from_slice(&self.as_i64().unwrap_or_default().to_be_bytes());
            }
            Datum::Decimal(m, s) => match self.as_i64() {
                Some(v) => {
                    key.push(2);
                    key.extend_from_slice(&v.to_be_bytes());
                }
                None => {
                    let (m, s) = decimal_trim(*m, *s);
                    key.push(3);
                    key.push(s);
                    key.extend_from_slice(&m.to_be_bytes());
                }
            },
            Datum::Float64(v) => {
                key.push(4);
                key.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            Datum::Text(s) => {
                key.push(5);
                let folded;
                let bytes = if case_sensitive {
                    s.as_bytes()
                } else {
                    folded = s.to_ascii_lowercase();
                    folded.as_bytes()
                };
                key.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                key.extend_from_slice(bytes);
            }
            Datum::Timestamp(v) => {
                key.push(6);
                key.extend_from_slice(&v.to_be_bytes());
            }
            Datum::Date(v) => {
                key.push(7);
                key.extend_from_slice(&v.to_be_bytes());
            }
            Datum::Bytea(bytes) => {
                key.push(8);
                key.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                key.extend_from_slice(bytes);
            }
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "yes" | "on" => Some(true),
        "f" | "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn cmp_ignore_ascii_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Int32(v) => write!(f, "{}", v),
            Datum::Int64(v) => write!(f, "{}", v),
            Datum::Float64(v) => write!(f, "{}", v),
            Datum::Decimal(m, s) => write!(f, "{}", decimal_to_string(*m, *s)),
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Timestamp(us) => {
                let secs = us.div_euclid(1_000_000);
                let nsecs = (us.rem_euclid(1_000_000) * 1000) as u32;
                match chrono::DateTime::from_timestamp(secs, nsecs) {
                    Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
                    None => write!(f, "{}", us),
                }
            }
            Datum::Date(days) => {
                let epoch =
                    chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(chrono::NaiveDate::MIN);
                match epoch.checked_add_signed(chrono::Duration::days(*days as i64)) {
                    Some(d) => write!(f, "{}", d.format("%Y-%m-%d")),
                    None => write!(f, "{}", days),
                }
            }
            Datum::Bytea(bytes) => {
                write!(f, "\\x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) => false, // NULL != NULL in SQL
            (Datum::Null, _) | (_, Datum::Null) => false,
            (Datum::Boolean(a), Datum::Boolean(b)) => a == b,
            (Datum::Text(a), Datum::Text(b)) => a == b,
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a == b,
            (Datum::Date(a), Datum::Date(b)) => a == b,
            (Datum::Bytea(a), Datum::Bytea(b)) => a == b,
            _ => self.partial_cmp(other) == Some(Ordering::Equal),
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash the key encoding so that Int32(x), Int64(x) and Decimal(x, 0)
        // hash alike, matching PartialEq.
        let mut key = Vec::new();
        self.encode_key(true, &mut key);
        key.hash(state);
    }
}

#[allow(clippy::non_canonical_partial_ord_impl)]
impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Datum::Null, _) | (_, Datum::Null) => None,
            (Datum::Boolean(a), Datum::Boolean(b)) => a.partial_cmp(b),
            (Datum::Int32(a), Datum::Int32(b)) => a.partial_cmp(b),
            (Datum::Int64(a), Datum::Int64(b)) => a.partial_cmp(b),
            (Datum::Int32(a), Datum::Int64(b)) => (*a as i64).partial_cmp(b),
            (Datum::Int64(a), Datum::Int32(b)) => a.partial_cmp(&(*b as i64)),
            (Datum::Float64(a), Datum::Float64(b)) => a.partial_cmp(b),
            // Mantissas that cannot be rescaled exactly compare as floats.
            (Datum::Decimal(a, sa), Datum::Decimal(b, sb)) => {
                match decimal_normalize(*a, *sa, *b, *sb) {
                    Some((na, nb)) => na.partial_cmp(&nb),
                    None => self.as_f64()?.partial_cmp(&other.as_f64()?),
                }
            }
            (Datum::Decimal(a, sa), Datum::Int32(_) | Datum::Int64(_)) => {
                match decimal_normalize(*a, *sa, other.as_i64()? as i128, 0) {
                    Some((na, nb)) => na.partial_cmp(&nb),
                    None => self.as_f64()?.partial_cmp(&other.as_f64()?),
                }
            }
            (Datum::Int32(_) | Datum::Int64(_), Datum::Decimal(b, sb)) => {
                match decimal_normalize(self.as_i64()? as i128, 0, *b, *sb) {
                    Some((na, nb)) => na.partial_cmp(&nb),
                    None => self.as_f64()?.partial_cmp(&other.as_f64()?),
                }
            }
            (
                Datum::Float64(_) | Datum::Int32(_) | Datum::Int64(_) | Datum::Decimal(_, _),
                Datum::Float64(_) | Datum::Int32(_) | Datum::Int64(_) | Datum::Decimal(_, _),
            ) => self.as_f64()?.partial_cmp(&other.as_f64()?),
            (Datum::Text(a), Datum::Text(b)) => a.partial_cmp(b),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a.partial_cmp(b),
            (Datum::Date(a), Datum::Date(b)) => a.partial_cmp(b),
            (Datum::Bytea(a), Datum::Bytea(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

/// A row is an ordered list of datums. Stored 0-based; cursors expose it
/// 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedRow {
    pub values: Vec<Datum>,
}

impl OwnedRow {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    pub fn get(&self, idx: usize) -> Option<&Datum> {
        self.values.get(idx)
    }

    /// Fetch by 1-based column index.
    pub fn column(&self, index: usize) -> Option<&Datum> {
        index.checked_sub(1).and_then(|i| self.values.get(i))
    }

    /// Overwrite by 1-based column index. Out-of-range indices are ignored.
    pub fn set_column(&mut self, index: usize, value: Datum) {
        if let Some(slot) = index.checked_sub(1).and_then(|i| self.values.get_mut(i)) {
            *slot = value;
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for OwnedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

// ── Decimal helper functions ────────────────────────────────────────────

/// Convert a (mantissa, scale) decimal to its string representation.
/// e.g. (12345, 2) → "123.45", (-1, 3) → "-0.001", (100, 0) → "100"
pub fn decimal_to_string(mantissa: i128, scale: u8) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let negative = mantissa < 0;
    let s = mantissa.unsigned_abs().to_string();
    let scale = scale as usize;
    let result = if s.len() <= scale {
        format!("0.{}{}", "0".repeat(scale - s.len()), s)
    } else {
        let (int_part, frac_part) = s.split_at(s.len() - scale);
        format!("{}.{}", int_part, frac_part)
    };
    if negative {
        format!("-{}", result)
    } else {
        result
    }
}

/// Rescale two decimals to the larger scale. `None` when a mantissa does
/// not fit in i128 after rescaling.
fn decimal_normalize(a: i128, sa: u8, b: i128, sb: u8) -> Option<(i128, i128)> {
    if sa == sb {
        Some((a, b))
    } else if sa > sb {
        let factor = 10i128.checked_pow((sa - sb) as u32)?;
        Some((a, b.checked_mul(factor)?))
    } else {
        let factor = 10i128.checked_pow((sb - sa) as u32)?;
        Some((a.checked_mul(factor)?, b))
    }
}

/// Add two decimals at the larger scale; `None` on overflow.
fn decimal_add(a: i128, sa: u8, b: i128, sb: u8) -> Option<Datum> {
    let (na, nb) = decimal_normalize(a, sa, b, sb)?;
    Some(Datum::Decimal(na.checked_add(nb)?, sa.max(sb)))
}

/// Remove trailing zeros from a decimal for canonical form.
fn decimal_trim(mut mantissa: i128, mut scale: u8) -> (i128, u8) {
    if mantissa == 0 {
        return (0, 0);
    }
    while scale > 0 && mantissa % 10 == 0 {
        mantissa /= 10;
        scale -= 1;
    }
    (mantissa, scale)
}

/// Divide two decimals with a target result scale, rounding half away from zero.
pub fn decimal_div(a: i128, sa: u8, b: i128, sb: u8, result_scale: u8) -> Option<Datum> {
    if b == 0 {
        return None;
    }
    let target_scale = result_scale.max(sa).max(sb);
    // One extra digit for rounding.
    let extra = (target_scale as u32 + 1) + sb as u32 - sa as u32;
    let scaled_a = a.checked_mul(10i128.checked_pow(extra)?)?;
    let raw = scaled_a / b;
    let rounded = if raw >= 0 { (raw + 5) / 10 } else { (raw - 5) / 10 };
    Some(Datum::Decimal(rounded, target_scale))
}
