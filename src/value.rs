//! Typed decoding of stored strings.
//!
//! Each type has one textual grammar. Numbers are plain Rust literals, lists
//! are comma separated, and the geometry and date types are fixed-length
//! integer lists.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A stored string could not be read as the requested type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected {expected}, found {found:?}")]
    Invalid {
        expected: &'static str,
        found: String,
    },

    #[error("expected {expected} comma-separated integers, found {found}")]
    Arity { expected: &'static str, found: usize },
}

impl DecodeError {
    fn invalid(expected: &'static str, found: &str) -> Self {
        DecodeError::Invalid {
            expected,
            found: found.to_string(),
        }
    }
}

/// A type that can be stored as an entry value.
pub trait EntryValue: Sized {
    fn decode(raw: &str) -> Result<Self, DecodeError>;
    fn encode(&self) -> String;
}

impl EntryValue for String {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        Ok(raw.to_string())
    }

    fn encode(&self) -> String {
        self.clone()
    }
}

impl EntryValue for bool {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(true),
            "false" | "off" | "no" | "0" => Ok(false),
            _ => Err(DecodeError::invalid("a boolean", raw)),
        }
    }

    fn encode(&self) -> String {
        self.to_string()
    }
}

macro_rules! parsed_value {
    ($($ty:ty => $what:literal),* $(,)?) => {
        $(
            impl EntryValue for $ty {
                fn decode(raw: &str) -> Result<Self, DecodeError> {
                    raw.trim()
                        .parse()
                        .map_err(|_| DecodeError::invalid($what, raw))
                }

                fn encode(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

parsed_value! {
    i8 => "an integer", i16 => "an integer", i32 => "an integer",
    i64 => "an integer", i128 => "an integer", isize => "an integer",
    u8 => "an unsigned integer", u16 => "an unsigned integer",
    u32 => "an unsigned integer", u64 => "an unsigned integer",
    u128 => "an unsigned integer", usize => "an unsigned integer",
    f32 => "a number", f64 => "a number",
}

/// Comma-separated items. `\,` is a literal comma and `\\` a literal
/// backslash inside an item.
impl<T: EntryValue> EntryValue for Vec<T> {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        split_list(raw).iter().map(|item| T::decode(item)).collect()
    }

    fn encode(&self) -> String {
        let items: Vec<String> = self
            .iter()
            .map(|item| item.encode().replace('\\', "\\\\").replace(',', "\\,"))
            .collect();
        items.join(",")
    }
}

/// Split on unescaped commas. An empty string is an empty list.
pub fn split_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next @ (',' | '\\')) => current.push(next),
                Some(next) => {
                    current.push('\\');
                    current.push(next);
                }
                None => current.push('\\'),
            },
            ',' => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);
    items
}

fn int_list(raw: &str, expected: &'static str, lengths: &[usize]) -> Result<Vec<i64>, DecodeError> {
    let ints = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| DecodeError::invalid("an integer list", raw))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if lengths.contains(&ints.len()) {
        Ok(ints)
    } else {
        Err(DecodeError::Arity {
            expected,
            found: ints.len(),
        })
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, raw: &str) -> Result<T, DecodeError> {
    T::try_from(value).map_err(|_| DecodeError::invalid("a value in range", raw))
}

/// An RGBA color, or the explicit "no color" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Invalid,
    Rgba { r: u8, g: u8, b: u8, a: u8 },
}

impl Color {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color::Rgba { r, g, b, a: 255 }
    }
}

impl EntryValue for Color {
    /// `R,G,B[,A]`, `#rgb`, `#rrggbb`, `#aarrggbb`, or `invalid`.
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        let text = raw.trim();
        if text.eq_ignore_ascii_case("invalid") {
            return Ok(Color::Invalid);
        }
        if let Some(hex) = text.strip_prefix('#') {
            return decode_hex_color(hex).ok_or_else(|| DecodeError::invalid("a hex color", raw));
        }
        let ints = int_list(text, "3 or 4", &[3, 4])?;
        let mut channels = [255u8; 4];
        for (slot, &value) in channels.iter_mut().zip(&ints) {
            *slot = narrow(value, raw)?;
        }
        let [r, g, b, a] = channels;
        Ok(Color::Rgba { r, g, b, a })
    }

    fn encode(&self) -> String {
        match *self {
            Color::Invalid => "invalid".to_string(),
            Color::Rgba { r, g, b, a: 255 } => format!("{r},{g},{b}"),
            Color::Rgba { r, g, b, a } => format!("{r},{g},{b},{a}"),
        }
    }
}

fn decode_hex_color(hex: &str) -> Option<Color> {
    if !hex.is_ascii() {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => {
            let nibble = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok().map(|n| n * 17);
            Some(Color::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
        }
        6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Color::Rgba {
            a: byte(0)?,
            r: byte(2)?,
            g: byte(4)?,
            b: byte(6)?,
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl EntryValue for Point {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        let v = int_list(raw, "2", &[2])?;
        Ok(Point {
            x: narrow(v[0], raw)?,
            y: narrow(v[1], raw)?,
        })
    }

    fn encode(&self) -> String {
        format!("{},{}", self.x, self.y)
    }
}

impl EntryValue for Size {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        let v = int_list(raw, "2", &[2])?;
        Ok(Size {
            width: narrow(v[0], raw)?,
            height: narrow(v[1], raw)?,
        })
    }

    fn encode(&self) -> String {
        format!("{},{}", self.width, self.height)
    }
}

impl EntryValue for Rect {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        let v = int_list(raw, "4", &[4])?;
        Ok(Rect {
            x: narrow(v[0], raw)?,
            y: narrow(v[1], raw)?,
            width: narrow(v[2], raw)?,
            height: narrow(v[3], raw)?,
        })
    }

    fn encode(&self) -> String {
        format!("{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

/// `year,month,day`. A full date-time list is accepted and its time ignored.
impl EntryValue for NaiveDate {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        let v = int_list(raw, "3 or 6", &[3, 6])?;
        date_from(&v, raw)
    }

    fn encode(&self) -> String {
        use chrono::Datelike;
        format!("{},{},{}", self.year(), self.month(), self.day())
    }
}

/// `year,month,day,hour,minute,second`.
impl EntryValue for NaiveDateTime {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        let v = int_list(raw, "6", &[6])?;
        let date = date_from(&v, raw)?;
        let time = NaiveTime::from_hms_opt(narrow(v[3], raw)?, narrow(v[4], raw)?, narrow(v[5], raw)?)
            .ok_or_else(|| DecodeError::invalid("a valid time", raw))?;
        Ok(date.and_time(time))
    }

    fn encode(&self) -> String {
        use chrono::{Datelike, Timelike};
        format!(
            "{},{},{},{},{},{}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

fn date_from(v: &[i64], raw: &str) -> Result<NaiveDate, DecodeError> {
    NaiveDate::from_ymd_opt(narrow(v[0], raw)?, narrow(v[1], raw)?, narrow(v[2], raw)?)
        .ok_or_else(|| DecodeError::invalid("a valid date", raw))
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
