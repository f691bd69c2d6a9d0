//! Function and type descriptions.
//!
//! Descriptions are produced by the metadata layer (the backend's
//! dictionary lookup, or hand-built for tests) and consumed read-only by
//! the codec. A [`TypeDescription`] is shared as `Arc<TypeDescription>` and
//! never mutated once it has been built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::error::{Result, RfcError};
use super::types::RfcType;

pub const NAME_MAX: usize = 30;
pub const DEFAULT_VALUE_MAX: usize = 30;
pub const DESCRIPTIVE_TEXT_MAX: usize = 79;

/// Byte length of a table reference inside a structure or parameter list.
pub const TABLE_HANDLE_LENGTH: usize = 8;

/// Direction of a function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Import,
    Export,
    Changing,
    Table,
}

impl Direction {
    pub fn name(self) -> &'static str {
        match self {
            Direction::Import => "IMPORT",
            Direction::Export => "EXPORT",
            Direction::Changing => "CHANGING",
            Direction::Table => "TABLE",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One field of a structure or table line type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub rfc_type: RfcType,
    pub narrow_length: usize,
    pub wide_length: usize,
    pub narrow_offset: usize,
    pub wide_offset: usize,
    pub decimals: u32,
    /// Line type for `Structure` and `Table` fields.
    pub type_description: Option<Arc<TypeDescription>>,
}

impl FieldDescriptor {
    pub fn new(
        name: impl Into<String>,
        rfc_type: RfcType,
        narrow_length: usize,
        wide_length: usize,
    ) -> Self {
        Self {
            name: name.into(),
            rfc_type,
            narrow_length,
            wide_length,
            narrow_offset: 0,
            wide_offset: 0,
            decimals: 0,
            type_description: None,
        }
    }

    pub fn with_offsets(mut self, narrow_offset: usize, wide_offset: usize) -> Self {
        self.narrow_offset = narrow_offset;
        self.wide_offset = wide_offset;
        self
    }

    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn with_type(mut self, type_description: Arc<TypeDescription>) -> Self {
        self.type_description = Some(type_description);
        self
    }
}

/// Metadata of a structure or table line type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescription {
    name: String,
    narrow_length: usize,
    wide_length: usize,
    fields: Vec<FieldDescriptor>,
}

impl TypeDescription {
    /// Creates an empty type description with declared total lengths.
    ///
    /// # Errors
    ///
    /// Returns `RfcError::InvalidArgument` if the name is empty or longer
    /// than 30 characters.
    pub fn new(name: impl Into<String>, narrow_length: usize, wide_length: usize) -> Result<Self> {
        let name = name.into();
        validate_name("type", &name)?;
        Ok(Self {
            name,
            narrow_length,
            wide_length,
            fields: Vec::new(),
        })
    }

    /// Starts a builder that lays fields out sequentially.
    pub fn builder(name: impl Into<String>) -> TypeDescriptionBuilder {
        TypeDescriptionBuilder::new(name)
    }

    /// Appends a field.
    ///
    /// # Errors
    ///
    /// Returns `RfcError::InvalidArgument` if:
    /// - the field name is longer than 30 characters or already present
    /// - an unnamed field is combined with other fields
    /// - the nested type reference is missing for a structure/table field,
    ///   or present for any other field
    /// - the field extends past the declared narrow or wide length
    pub fn add_field(&mut self, field: FieldDescriptor) -> Result<()> {
        if field.name.chars().count() > NAME_MAX {
            return Err(RfcError::InvalidArgument(format!(
                "field name longer than {} characters: {:?}",
                NAME_MAX, field.name
            )));
        }
        if self.field(&field.name).is_some() {
            return Err(RfcError::InvalidArgument(format!(
                "duplicate field {:?} in type {}",
                field.name, self.name
            )));
        }
        let unnamed = field.name.is_empty() || self.fields.iter().any(|f| f.name.is_empty());
        if unnamed && !self.fields.is_empty() {
            return Err(RfcError::InvalidArgument(format!(
                "an unnamed field must be the only field of type {}",
                self.name
            )));
        }
        if field.rfc_type.is_complex() != field.type_description.is_some() {
            return Err(RfcError::InvalidArgument(format!(
                "field {:?} of type {}: nested type required exactly for STRUCTURE and TABLE",
                field.name, field.rfc_type
            )));
        }
        if field.narrow_offset + field.narrow_length > self.narrow_length
            || field.wide_offset + field.wide_length > self.wide_length
        {
            return Err(RfcError::InvalidArgument(format!(
                "field {:?} exceeds the length of type {} ({}/{})",
                field.name, self.name, self.narrow_length, self.wide_length
            )));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn narrow_length(&self) -> usize {
        self.narrow_length
    }

    pub fn wide_length(&self) -> usize {
        self.wide_length
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// A one-field type whose field is unnamed models a scalar line.
    pub fn is_scalar_wrapper(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].name.is_empty()
    }
}

/// Builds a [`TypeDescription`] by appending fields back to back.
///
/// Narrow and wide offsets are accumulated independently and the totals are
/// the sum of all field lengths.
///
/// # Example
///
/// ```
/// use rfcbridge_common::{RfcType, TypeDescription};
///
/// let line = TypeDescription::builder("SCALAR_LINE")
///     .field("", RfcType::Int, 4, 4)
///     .build()
///     .unwrap();
/// assert!(line.is_scalar_wrapper());
/// ```
#[derive(Debug, Clone)]
pub struct TypeDescriptionBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
    narrow_offset: usize,
    wide_offset: usize,
}

impl TypeDescriptionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            narrow_offset: 0,
            wide_offset: 0,
        }
    }

    pub fn field(
        self,
        name: impl Into<String>,
        rfc_type: RfcType,
        narrow_length: usize,
        wide_length: usize,
    ) -> Self {
        let field = FieldDescriptor::new(name, rfc_type, narrow_length, wide_length);
        self.push(field)
    }

    pub fn decimal_field(
        self,
        name: impl Into<String>,
        rfc_type: RfcType,
        narrow_length: usize,
        wide_length: usize,
        decimals: u32,
    ) -> Self {
        let field = FieldDescriptor::new(name, rfc_type, narrow_length, wide_length);
        self.push(field.with_decimals(decimals))
    }

    /// Appends a `Structure` or `Table` field referencing `line`.
    pub fn nested(
        self,
        name: impl Into<String>,
        rfc_type: RfcType,
        line: Arc<TypeDescription>,
    ) -> Self {
        let (narrow, wide) = nested_lengths(rfc_type, &line);
        let field = FieldDescriptor::new(name, rfc_type, narrow, wide);
        self.push(field.with_type(line))
    }

    fn push(mut self, field: FieldDescriptor) -> Self {
        let field = field.with_offsets(self.narrow_offset, self.wide_offset);
        self.narrow_offset += field.narrow_length;
        self.wide_offset += field.wide_length;
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Result<Arc<TypeDescription>> {
        let mut desc = TypeDescription::new(self.name, self.narrow_offset, self.wide_offset)?;
        for field in self.fields {
            desc.add_field(field)?;
        }
        Ok(Arc::new(desc))
    }
}

fn nested_lengths(rfc_type: RfcType, line: &TypeDescription) -> (usize, usize) {
    match rfc_type {
        RfcType::Table => (TABLE_HANDLE_LENGTH, TABLE_HANDLE_LENGTH),
        _ => (line.narrow_length(), line.wide_length()),
    }
}

/// One parameter of a remote function.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub rfc_type: RfcType,
    pub direction: Direction,
    pub narrow_length: usize,
    pub wide_length: usize,
    pub decimals: u32,
    pub default_value: String,
    pub descriptive_text: String,
    pub optional: bool,
    /// Structure type, or the row type of a `Table` parameter.
    pub type_description: Option<Arc<TypeDescription>>,
}

impl ParameterDescriptor {
    pub fn new(
        name: impl Into<String>,
        rfc_type: RfcType,
        direction: Direction,
        narrow_length: usize,
        wide_length: usize,
    ) -> Self {
        Self {
            name: name.into(),
            rfc_type,
            direction,
            narrow_length,
            wide_length,
            decimals: 0,
            default_value: String::new(),
            descriptive_text: String::new(),
            optional: false,
            type_description: None,
        }
    }

    /// A `Structure` or `Table` parameter with lengths taken from `line`.
    pub fn nested(
        name: impl Into<String>,
        rfc_type: RfcType,
        direction: Direction,
        line: Arc<TypeDescription>,
    ) -> Self {
        let (narrow, wide) = nested_lengths(rfc_type, &line);
        let parameter = Self::new(name, rfc_type, direction, narrow, wide);
        parameter.with_type(line)
    }

    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn with_default_value(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = default_value.into();
        self
    }

    pub fn with_descriptive_text(mut self, text: impl Into<String>) -> Self {
        self.descriptive_text = text.into();
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_type(mut self, type_description: Arc<TypeDescription>) -> Self {
        self.type_description = Some(type_description);
        self
    }

    /// Checks name and text widths and the nested type reference.
    pub fn validate(&self) -> Result<()> {
        validate_name("parameter", &self.name)?;
        if self.default_value.chars().count() > DEFAULT_VALUE_MAX {
            return Err(RfcError::InvalidArgument(format!(
                "default value of {} longer than {} characters",
                self.name, DEFAULT_VALUE_MAX
            )));
        }
        if self.descriptive_text.chars().count() > DESCRIPTIVE_TEXT_MAX {
            return Err(RfcError::InvalidArgument(format!(
                "descriptive text of {} longer than {} characters",
                self.name, DESCRIPTIVE_TEXT_MAX
            )));
        }
        if self.rfc_type.is_complex() != self.type_description.is_some() {
            return Err(RfcError::InvalidArgument(format!(
                "parameter {} of type {}: nested type required exactly for STRUCTURE and TABLE",
                self.name, self.rfc_type
            )));
        }
        Ok(())
    }
}

/// Metadata of a remote function module.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDescription {
    name: String,
    parameters: Vec<ParameterDescriptor>,
}

impl FunctionDescription {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name("function", &name)?;
        Ok(Self {
            name,
            parameters: Vec::new(),
        })
    }

    /// Validates and appends a parameter; names must be unique.
    pub fn add_parameter(&mut self, parameter: ParameterDescriptor) -> Result<()> {
        parameter.validate()?;
        if self.parameter(&parameter.name).is_some() {
            return Err(RfcError::InvalidArgument(format!(
                "duplicate parameter {} in function {}",
                parameter.name, self.name
            )));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    pub fn with_parameter(mut self, parameter: ParameterDescriptor) -> Result<Self> {
        self.add_parameter(parameter)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    let len = name.chars().count();
    if len == 0 || len > NAME_MAX {
        return Err(RfcError::InvalidArgument(format!(
            "{} name must be 1 to {} characters: {:?}",
            kind, NAME_MAX, name
        )));
    }
    Ok(())
}
