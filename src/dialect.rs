//! Message dialects and the source registry.
//!
//! Every operator group formats its status reports differently, so each
//! group gets a dialect: an ordered table of field patterns plus the names of
//! the fields that drive changeover detection. Dialects form a closed set
//! ([`DialectKind`]); the registry maps chat group names onto them.

use crate::constants::columns;
use crate::error::{Result, TelemetryError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Storage policy for an extracted field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Parsed as a decimal number
    Numeric,
    /// Kept verbatim (cylinder counts, skid identifiers)
    Text,
}

/// One named field and the pattern that captures it
#[derive(Debug, Clone)]
pub struct FieldPattern {
    pub name: String,
    pub kind: FieldKind,
    pub regex: Regex,
}

/// Compiled pattern set for one message format
#[derive(Debug, Clone)]
pub struct Dialect {
    name: String,
    fields: Vec<FieldPattern>,
    pressure_field: String,
    flow_field: String,
}

impl Dialect {
    /// Compile a dialect from `(field, kind, pattern)` triples.
    ///
    /// Patterns are matched case-insensitively and must contain a capture
    /// group. The pressure and flow fields must be numeric fields of the
    /// dialect.
    pub fn new(
        name: impl Into<String>,
        fields: &[(&str, FieldKind, &str)],
        pressure_field: &str,
        flow_field: &str,
    ) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| TelemetryError::InvalidDialect {
            dialect: name.clone(),
            reason,
        };

        let mut compiled: Vec<FieldPattern> = Vec::with_capacity(fields.len());
        for (field, kind, pattern) in fields {
            if compiled.iter().any(|existing| existing.name == *field) {
                return Err(invalid(format!("duplicate field '{}'", field)));
            }
            if columns::STANDARD.contains(field) || *field == columns::WRITTEN_AT {
                return Err(invalid(format!("field '{}' shadows a table column", field)));
            }

            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| invalid(format!("bad pattern for '{}': {}", field, e)))?;

            if regex.captures_len() < 2 {
                return Err(invalid(format!(
                    "pattern for '{}' has no capture group",
                    field
                )));
            }

            compiled.push(FieldPattern {
                name: field.to_string(),
                kind: *kind,
                regex,
            });
        }

        for designated in [pressure_field, flow_field] {
            match compiled.iter().find(|f| f.name == designated) {
                None => {
                    return Err(invalid(format!(
                        "designated field '{}' is not defined",
                        designated
                    )));
                }
                Some(field) if field.kind != FieldKind::Numeric => {
                    return Err(invalid(format!(
                        "designated field '{}' must be numeric",
                        designated
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            name,
            fields: compiled,
            pressure_field: pressure_field.to_string(),
            flow_field: flow_field.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldPattern] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldPattern> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn pressure_field(&self) -> &str {
        &self.pressure_field
    }

    pub fn flow_field(&self) -> &str {
        &self.flow_field
    }
}

/// Known message formats, one per operator group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Dispatch,
    Wasil,
    Tempo,
    Splendor,
    NigaChem,
}

pub const PRESSURE_FIELD: &str = "inlet_pressure";
pub const FLOW_FIELD: &str = "total_flow";

use FieldKind::{Numeric, Text};

const DISPATCH_FIELDS: &[(&str, FieldKind, &str)] = &[
    ("empty", Text, r"Empty:\s*(\d+)"),
    ("standby", Text, r"Standby:\s*(\d+)"),
    ("decanting", Text, r"Decanting:\s*(\d+)"),
    ("in_transit", Text, r"In transit:\s*(\d+)"),
    ("inlet_pressure", Numeric, r"Inlet pressure:\s*([\d.]+)\s*bar"),
    ("inlet_temp", Numeric, r"Inlet temp:\s*([\d.]+)\s*[°⁰]C"),
    ("flow_rate", Numeric, r"Flow rate:\s*([\d.]+)\s*scm/hr"),
    ("total_flow", Numeric, r"Total flow:\s*([\d.]+)\s*scm"),
    ("discharge_temp", Numeric, r"Discharge Temp:\s*([\d.]+)\s*[°⁰]C"),
    ("discharge_pressure", Numeric, r"Discharge Pressure:\s*([\d.]+)\s*bar"),
    ("skid_no", Text, r"Skid No:\s*(\d+)"),
];

const WASIL_FIELDS: &[(&str, FieldKind, &str)] = &[
    ("empty", Text, r"Empty\s*[:=-]\s*(\d+)"),
    ("standby", Text, r"Stand-?by\s*[:=-]\s*(\d+)"),
    ("decanting", Text, r"Decanting\s*[:=-]\s*(\d+)"),
    ("in_transit", Text, r"(?:In[ -]?transit|Enroute)\s*[:=-]\s*(\d+)"),
    ("inlet_pressure", Numeric, r"Inlet\s+(?:pressure|press|pr)\.?\s*[:=-]\s*([\d.]+)\s*bar"),
    ("inlet_temp", Numeric, r"Inlet\s+temp(?:erature)?\.?\s*[:=-]\s*([\d.]+)\s*[°⁰]?C"),
    ("flow_rate", Numeric, r"Flow\s*rate\s*[:=-]\s*([\d.]+)\s*(?:scm|sm3)/h"),
    ("total_flow", Numeric, r"(?:Total\s*flow|Totali[sz]er)\s*[:=-]\s*([\d.]+)\s*(?:scm|sm3)"),
    ("discharge_temp", Numeric, r"(?:Discharge|Outlet)\s+temp(?:erature)?\.?\s*[:=-]\s*([\d.]+)\s*[°⁰]?C"),
    ("discharge_pressure", Numeric, r"(?:Discharge|Outlet)\s+(?:pressure|press|pr)\.?\s*[:=-]\s*([\d.]+)\s*bar"),
    ("skid_no", Text, r"Skid\s*(?:No\.?|number|#)\s*[:=-]?\s*(\w+)"),
];

const TEMPO_FIELDS: &[(&str, FieldKind, &str)] = &[
    ("empty", Text, r"Empty(?:\s+trailers?)?:\s*(\d+)"),
    ("standby", Text, r"Standby(?:\s+trailers?)?:\s*(\d+)"),
    ("decanting", Text, r"Decanting(?:\s+trailers?)?:\s*(\d+)"),
    ("in_transit", Text, r"In transit(?:\s+trailers?)?:\s*(\d+)"),
    ("inlet_pressure", Numeric, r"(?:Inlet|Upstream) pressure:\s*([\d.]+)\s*bar"),
    ("inlet_temp", Numeric, r"(?:Inlet|Upstream) temp:\s*([\d.]+)\s*[°⁰]C"),
    ("flow_rate", Numeric, r"Flow rate:\s*([\d.]+)\s*scm/hr"),
    ("total_flow", Numeric, r"(?:Total|Cumulative) flow:\s*([\d.]+)\s*scm"),
    ("discharge_temp", Numeric, r"(?:Discharge|Downstream) temp:\s*([\d.]+)\s*[°⁰]C"),
    ("discharge_pressure", Numeric, r"(?:Discharge|Downstream) pressure:\s*([\d.]+)\s*bar"),
    ("skid_no", Text, r"Skid No:\s*(\d+)"),
];

const SPLENDOR_FIELDS: &[(&str, FieldKind, &str)] = &[
    ("empty", Text, r"Empty\s*:\s*(\d+)"),
    ("standby", Text, r"Standby\s*:\s*(\d+)"),
    ("decanting", Text, r"(?:Decanting|Online)\s*:\s*(\d+)"),
    ("in_transit", Text, r"In transit\s*:\s*(\d+)"),
    ("inlet_pressure", Numeric, r"(?:Inlet pressure|P\.?\s*in)\s*:\s*([\d.]+)\s*bar"),
    ("inlet_temp", Numeric, r"(?:Inlet temp|T\.?\s*in)\s*:\s*([\d.]+)\s*[°⁰]C"),
    ("flow_rate", Numeric, r"Flow rate\s*:\s*([\d.]+)\s*scm/hr"),
    ("total_flow", Numeric, r"Total flow\s*:\s*([\d.]+)\s*scm"),
    ("discharge_temp", Numeric, r"(?:Discharge temp|T\.?\s*out)\s*:\s*([\d.]+)\s*[°⁰]C"),
    ("discharge_pressure", Numeric, r"(?:Discharge pressure|P\.?\s*out)\s*:\s*([\d.]+)\s*bar"),
    ("skid_no", Text, r"Skid(?: No)?\s*:\s*(\d+)"),
];

const NIGACHEM_FIELDS: &[(&str, FieldKind, &str)] = &[
    ("empty", Text, r"Empty\s*(?:cylinders?)?\s*[:=]\s*(\d+)"),
    ("standby", Text, r"Standby\s*(?:cylinders?)?\s*[:=]\s*(\d+)"),
    ("decanting", Text, r"Decanting\s*(?:cylinders?)?\s*[:=]\s*(\d+)"),
    ("in_transit", Text, r"In transit\s*(?:cylinders?)?\s*[:=]\s*(\d+)"),
    ("inlet_pressure", Numeric, r"Inlet pressure\s*[:=]\s*([\d.]+)\s*bar"),
    ("inlet_temp", Numeric, r"Inlet temp\s*[:=]\s*([\d.]+)\s*(?:deg|[°⁰])\s*C"),
    ("flow_rate", Numeric, r"Flow rate\s*[:=]\s*([\d.]+)\s*scm/hr"),
    ("total_flow", Numeric, r"Total flow\s*[:=]\s*([\d.]+)\s*scm"),
    ("discharge_temp", Numeric, r"Discharge temp\s*[:=]\s*([\d.]+)\s*(?:deg|[°⁰])\s*C"),
    ("discharge_pressure", Numeric, r"Discharge pressure\s*[:=]\s*([\d.]+)\s*bar"),
    ("skid_no", Text, r"Skid No\.?\s*[:=]\s*(\d+)"),
];

impl DialectKind {
    pub const ALL: [DialectKind; 5] = [
        DialectKind::Dispatch,
        DialectKind::Wasil,
        DialectKind::Tempo,
        DialectKind::Splendor,
        DialectKind::NigaChem,
    ];

    /// Chat group name that uses this dialect out of the box
    pub fn default_source(&self) -> &'static str {
        match self {
            DialectKind::Dispatch => "CNG Dispatch Group",
            DialectKind::Wasil => "Wasil CNG Group",
            DialectKind::Tempo => "Tempo CNG Group",
            DialectKind::Splendor => "Splendor CNG Group",
            DialectKind::NigaChem => "NigaChem CNG Group",
        }
    }

    fn field_table(&self) -> &'static [(&'static str, FieldKind, &'static str)] {
        match self {
            DialectKind::Dispatch => DISPATCH_FIELDS,
            DialectKind::Wasil => WASIL_FIELDS,
            DialectKind::Tempo => TEMPO_FIELDS,
            DialectKind::Splendor => SPLENDOR_FIELDS,
            DialectKind::NigaChem => NIGACHEM_FIELDS,
        }
    }

    /// Compile this kind's pattern table
    pub fn build(&self) -> Result<Dialect> {
        Dialect::new(
            self.to_string(),
            self.field_table(),
            PRESSURE_FIELD,
            FLOW_FIELD,
        )
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialectKind::Dispatch => "dispatch",
            DialectKind::Wasil => "wasil",
            DialectKind::Tempo => "tempo",
            DialectKind::Splendor => "splendor",
            DialectKind::NigaChem => "nigachem",
        };
        f.write_str(name)
    }
}

/// Maps source identifiers to compiled dialects
#[derive(Debug, Clone)]
pub struct DialectRegistry {
    sources: HashMap<String, DialectKind>,
    dialects: HashMap<DialectKind, Arc<Dialect>>,
}

impl DialectRegistry {
    /// Registry with every built-in dialect bound to its default group name
    pub fn builtin() -> Result<Self> {
        let mut dialects = HashMap::new();
        let mut sources = HashMap::new();

        for kind in DialectKind::ALL {
            dialects.insert(kind, Arc::new(kind.build()?));
            sources.insert(kind.default_source().to_string(), kind);
        }

        debug!("Compiled {} built-in dialects", dialects.len());
        Ok(Self { sources, dialects })
    }

    /// Bind additional source identifiers to existing dialects
    pub fn with_aliases<'a>(
        mut self,
        aliases: impl IntoIterator<Item = (&'a String, &'a DialectKind)>,
    ) -> Self {
        for (source_id, kind) in aliases {
            debug!("Aliasing source '{}' to dialect {}", source_id, kind);
            self.sources.insert(source_id.clone(), *kind);
        }
        self
    }

    /// Dialect for a source, `None` when the source is not registered
    pub fn lookup(&self, source_id: &str) -> Option<&Arc<Dialect>> {
        self.sources
            .get(source_id)
            .and_then(|kind| self.dialects.get(kind))
    }

    pub fn kind_of(&self, source_id: &str) -> Option<DialectKind> {
        self.sources.get(source_id).copied()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}
