//! Structural parser for Vietnamese plate strings.
//!
//! Rules are held in one ordered table and evaluated with a short-circuiting
//! `find_map`: the first rule that matches decides province code, serial and
//! number. Special punctuated formats come first, then the bare five digit
//! motorcycle plate, then the canonical grammars, then a loose split on
//! separators as the last structural interpretation.

use crate::pipeline::provinces::resolve_province_name;
use common::plates::{PlateRecord, PlateType, VehicleType};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

/// Grammar a plate string was matched by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateFormat {
    /// `DD-LD DDD.DD`
    DottedLetterDigit,
    /// `DD-L D-DDD.DD`
    DottedSplitSerial,
    /// `DD-L+ DDD+`
    LetterRun,
    /// `DD-L{1,2} D+`
    ShortSerial,
    /// `DDDDD`
    Motorcycle,
    /// `DDL DDDD(D)`
    SingleLetter,
    /// `DDLL DDDD(D)`
    DoubleLetter,
    /// `DDLD DDDD(D)`
    LetterDigit,
    Fallback,
}

impl PlateFormat {
    /// Human readable label carried in `PlateRecord::format`.
    pub fn label(&self) -> &'static str {
        match self {
            PlateFormat::DottedLetterDigit => "Biển số có dấu chấm (DD-LD DDD.DD)",
            PlateFormat::DottedSplitSerial => "Biển số có dấu chấm (DD-L D-DDD.DD)",
            PlateFormat::LetterRun => "Biển số đặc biệt (DD-L+ DDD+)",
            PlateFormat::ShortSerial => "Biển số đặc biệt (DD-L D+)",
            PlateFormat::Motorcycle => "Biển số xe máy 5 số (DDDDD)",
            PlateFormat::SingleLetter => "Biển số tiêu chuẩn 1 chữ cái (DDL-DDDDD)",
            PlateFormat::DoubleLetter => "Biển số tiêu chuẩn 2 chữ cái (DDLL-DDDDD)",
            PlateFormat::LetterDigit => "Biển số tiêu chuẩn chữ và số (DDLD-DDDDD)",
            PlateFormat::Fallback => "fallback",
        }
    }

    /// Stable identifier for logs and metric labels.
    pub fn id(&self) -> &'static str {
        match self {
            PlateFormat::DottedLetterDigit => "dotted_letter_digit",
            PlateFormat::DottedSplitSerial => "dotted_split_serial",
            PlateFormat::LetterRun => "letter_run",
            PlateFormat::ShortSerial => "short_serial",
            PlateFormat::Motorcycle => "motorcycle",
            PlateFormat::SingleLetter => "single_letter",
            PlateFormat::DoubleLetter => "double_letter",
            PlateFormat::LetterDigit => "letter_digit",
            PlateFormat::Fallback => "fallback",
        }
    }

    /// Punctuated formats that keep the text verbatim as `normalized`.
    pub fn is_special(&self) -> bool {
        matches!(
            self,
            PlateFormat::DottedLetterDigit
                | PlateFormat::DottedSplitSerial
                | PlateFormat::LetterRun
                | PlateFormat::ShortSerial
        )
    }
}

/// Which rendition of the input a rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputForm {
    /// Trimmed and uppercased.
    Verbatim,
    /// Uppercased with all whitespace removed; dashes and dots survive.
    Compact,
}

#[derive(Debug, Default, PartialEq)]
struct Fields {
    province_code: String,
    serial: String,
    number: String,
}

enum Matcher {
    Pattern {
        regex: Regex,
        extract: fn(&Captures) -> Fields,
    },
    SeparatorSplit,
}

struct GrammarRule {
    format: PlateFormat,
    input: InputForm,
    matcher: Matcher,
}

struct Forms {
    verbatim: String,
    compact: String,
}

impl Forms {
    fn of(text: &str) -> Self {
        let verbatim = text.trim().to_uppercase();
        let compact = strip_whitespace(&verbatim);
        Self { verbatim, compact }
    }

    fn get(&self, input: InputForm) -> &str {
        match input {
            InputForm::Verbatim => &self.verbatim,
            InputForm::Compact => &self.compact,
        }
    }
}

impl GrammarRule {
    fn attempt(&self, forms: &Forms) -> Option<Fields> {
        let text = forms.get(self.input);
        match &self.matcher {
            Matcher::Pattern { regex, extract } => regex.captures(text).map(|caps| extract(&caps)),
            Matcher::SeparatorSplit => split_on_separators(text),
        }
    }
}

fn group<'t>(caps: &Captures<'t>, index: usize) -> &'t str {
    caps.get(index).map_or("", |m| m.as_str())
}

fn three_groups(caps: &Captures) -> Fields {
    Fields {
        province_code: group(caps, 1).to_string(),
        serial: group(caps, 2).to_string(),
        number: group(caps, 3).to_string(),
    }
}

fn split_serial(caps: &Captures) -> Fields {
    Fields {
        province_code: group(caps, 1).to_string(),
        serial: format!("{}{}", group(caps, 2), group(caps, 3)),
        number: group(caps, 4).to_string(),
    }
}

fn number_only(caps: &Captures) -> Fields {
    Fields {
        number: group(caps, 0).to_string(),
        ..Fields::default()
    }
}

static SEPARATORS: Lazy<Regex> = Lazy::new(|| pattern(r"[-\s.]+"));

/// Loose recovery for punctuated text no grammar accepted.
fn split_on_separators(text: &str) -> Option<Fields> {
    if !text.contains(['-', '.']) {
        return None;
    }

    let parts: Vec<&str> = SEPARATORS.split(text).filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return None;
    }

    Some(Fields {
        province_code: parts[0].chars().take(2).collect(),
        serial: parts[1].to_string(),
        number: parts[2..].join("."),
    })
}

// Only fixed literals reach this, covered by the table tests.
#[allow(clippy::expect_used)]
fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("static plate pattern is valid")
}

static SPECIAL_PATTERNS: [(PlateFormat, &str, fn(&Captures) -> Fields); 4] = [
    (
        PlateFormat::DottedLetterDigit,
        r"^(\d{2})-([A-Z]\d)\s?(\d{3}\.\d{2})$",
        three_groups,
    ),
    (
        PlateFormat::DottedSplitSerial,
        r"^(\d{2})-([A-Z])\s?(\d)-(\d{3}\.\d{2})$",
        split_serial,
    ),
    (PlateFormat::LetterRun, r"^(\d{2})-([A-Z]+)\s?(\d{3,})$", three_groups),
    (PlateFormat::ShortSerial, r"^(\d{2})-([A-Z]{1,2})\s?(\d+)$", three_groups),
];

static RULES: Lazy<Vec<GrammarRule>> = Lazy::new(|| {
    let special = |input: InputForm| {
        SPECIAL_PATTERNS
            .iter()
            .map(move |&(format, source, extract)| GrammarRule {
                format,
                input,
                matcher: Matcher::Pattern {
                    regex: pattern(source),
                    extract,
                },
            })
    };
    let canonical = |format: PlateFormat, source: &str, extract: fn(&Captures) -> Fields| GrammarRule {
        format,
        input: InputForm::Compact,
        matcher: Matcher::Pattern {
            regex: pattern(source),
            extract,
        },
    };

    special(InputForm::Verbatim)
        .chain(special(InputForm::Compact))
        .chain([
            canonical(PlateFormat::Motorcycle, r"^\d{5}$", number_only),
            canonical(
                PlateFormat::SingleLetter,
                r"^(\d{2})-?([A-Z])-?(\d{4,5}|\d{3}\.\d{2})$",
                three_groups,
            ),
            canonical(
                PlateFormat::DoubleLetter,
                r"^(\d{2})-?([A-Z]{2})-?(\d{4,5}|\d{3}\.\d{2})$",
                three_groups,
            ),
            canonical(
                PlateFormat::LetterDigit,
                r"^(\d{2})-?([A-Z]\d)-?(\d{4,5}|\d{3}\.\d{2})$",
                three_groups,
            ),
            GrammarRule {
                format: PlateFormat::Fallback,
                input: InputForm::Verbatim,
                matcher: Matcher::SeparatorSplit,
            },
        ])
        .collect()
});

/// Remove every whitespace character, keeping dashes and dots.
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Special punctuated format matching `text` as given (trimmed, uppercased).
pub fn matches_special_format(text: &str) -> Option<PlateFormat> {
    let forms = Forms::of(text);
    RULES
        .iter()
        .filter(|rule| rule.format.is_special() && rule.input == InputForm::Verbatim)
        .find(|rule| rule.attempt(&forms).is_some())
        .map(|rule| rule.format)
}

/// Diplomatic / international marker found anywhere in the text.
pub fn tag_plate_type(text: &str) -> Option<PlateType> {
    let letters: String = text
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect();

    if letters.contains("QT") {
        Some(PlateType::International)
    } else if letters.contains("NG") {
        Some(PlateType::Diplomatic)
    } else {
        None
    }
}

/// Parse a plate string. Never fails; unmatched text yields `is_valid == false`.
pub fn parse(text: &str) -> PlateRecord {
    parse_with_format(text).0
}

/// Parse and also report which grammar matched.
pub fn parse_with_format(text: &str) -> (PlateRecord, Option<PlateFormat>) {
    let forms = Forms::of(text);
    let tag = tag_plate_type(text);

    let Some((format, fields)) = RULES
        .iter()
        .find_map(|rule| rule.attempt(&forms).map(|fields| (rule.format, fields)))
    else {
        let mut record = PlateRecord::unparsed(text, forms.compact);
        record.plate_type = tag;
        return (record, None);
    };

    if format == PlateFormat::Fallback {
        debug!(text, "plate parsed by separator fallback");
    }

    let normalized = if format.is_special() {
        text.to_string()
    } else {
        forms.compact
    };

    let vehicle_type = if format == PlateFormat::Motorcycle {
        Some(VehicleType::Motorcycle)
    } else {
        fields.serial.chars().next().map(VehicleType::from_serial_letter)
    };

    let record = PlateRecord {
        original: text.to_string(),
        normalized,
        province_name: resolve_province_name(&fields.province_code),
        province_code: fields.province_code,
        serial: fields.serial,
        number: fields.number,
        vehicle_type,
        vehicle_type_info: vehicle_type.map(|v| v.info()),
        plate_type: Some(tag.unwrap_or(PlateType::Personal)),
        detected_color: None,
        is_valid: true,
        format: format.label().to_string(),
    };

    (record, Some(format))
}
