//! Reporting of problems found while parsing and validating directories.
//!
//! Diagnostics are observational: whether a sink is attached, and which one, never changes
//! the outcome of parsing or validation.

use crate::tags::{self, parent, IfdValueType};
use std::fmt::{Display, Formatter};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// A soft failure. The file violates the format but parsing continues.
    Warning,
    /// A structural failure. The directory is not usable as DNG.
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A sink receiving every soft and structural validation failure.
pub trait Diagnostics {
    fn report(&self, severity: Severity, message: &str);

    fn warning(&self, message: &str) {
        self.report(Severity::Warning, message)
    }

    fn error(&self, message: &str) {
        self.report(Severity::Error, message)
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {
    fn report(&self, _severity: Severity, _message: &str) {}
}

/// Keeps every reported message, e.g. to present a validation report.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    messages: Mutex<Vec<(Severity, String)>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.with_severity(Severity::Warning)
    }

    pub fn errors(&self) -> Vec<String> {
        self.with_severity(Severity::Error)
    }

    fn with_severity(&self, severity: Severity) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, message)| message)
            .collect()
    }
}

impl Diagnostics for CollectingDiagnostics {
    fn report(&self, severity: Severity, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((severity, message.to_string()));
        }
    }
}

/// A human readable name for the directory identified by `parent_code`.
pub fn parent_name(parent_code: u32) -> String {
    match parent_code {
        parent::IFD0 => "IFD 0".to_string(),
        parent::EXIF_IFD => "Exif IFD".to_string(),
        parent::GPS_INFO => "GPS IFD".to_string(),
        parent::INTEROPERABILITY_IFD => "Interoperability IFD".to_string(),
        code @ parent::FIRST_SUB_IFD..=parent::LAST_SUB_IFD => {
            format!("SubIFD {}", code - parent::FIRST_SUB_IFD + 1)
        }
        code @ parent::FIRST_CHAINED_IFD..=parent::LAST_CHAINED_IFD => {
            format!("Chained IFD {}", code - parent::FIRST_CHAINED_IFD + 1)
        }
        code => format!("ParentIFD {code}"),
    }
}

pub fn tag_name(parent_code: u32, tag_code: u32) -> String {
    match tags::tag_name(parent_code, tag_code) {
        Some(name) => name.to_string(),
        None => format!("Tag{tag_code}"),
    }
}

pub fn tag_type_name(tag_type: u16) -> String {
    match IfdValueType::try_from(tag_type) {
        Ok(dtype) => dtype.name().to_string(),
        Err(_) => format!("Type{tag_type}"),
    }
}

/// Names a value of an enumerated tag, falling back to the number for unknown values.
pub fn enum_name<T>(value: u32) -> String
where
    T: TryFrom<u32> + Display,
{
    match T::try_from(value) {
        Ok(known) => known.to_string(),
        Err(_) => value.to_string(),
    }
}

pub fn cfa_color_name(color: u8) -> String {
    match tags::CfaColor::try_from(color as u32) {
        Ok(known) => known.to_string(),
        Err(_) => format!("Color{color}"),
    }
}
