//! Value codec.
//!
//! Converts between host [`Value`]s and backend containers, dispatching on
//! the declared [`RfcType`] of each field:
//!
//! - [`fill`](fill_value) writes a host value into a container field
//! - [`wrap`](wrap_value) reads a container field back as a host value
//!
//! Both directions recurse through structures and tables and attach the
//! field name to any error on the way out, so a failure deep inside a table
//! row reports the full field path.

mod buffer;
mod fill;
mod wrap;

use std::sync::Arc;

use rfcbridge_common::{
    ConnectionConfig, Direction, ErrorInfo, FieldContext, FieldDescriptor, FunctionDescription,
    ParameterDescriptor, Record, Result, RfcType, TypeDescription, Value, WrapPolicy,
};

use crate::backend::Container;

pub use fill::fill_value;
pub use wrap::wrap_value;

/// The parts of a field or parameter descriptor the codec needs.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec<'a> {
    pub name: &'a str,
    pub rfc_type: RfcType,
    pub narrow_length: usize,
    pub wide_length: usize,
    pub decimals: u32,
    pub type_description: Option<&'a Arc<TypeDescription>>,
}

impl<'a> From<&'a FieldDescriptor> for FieldSpec<'a> {
    fn from(field: &'a FieldDescriptor) -> Self {
        Self {
            name: &field.name,
            rfc_type: field.rfc_type,
            narrow_length: field.narrow_length,
            wide_length: field.wide_length,
            decimals: field.decimals,
            type_description: field.type_description.as_ref(),
        }
    }
}

impl<'a> From<&'a ParameterDescriptor> for FieldSpec<'a> {
    fn from(parameter: &'a ParameterDescriptor) -> Self {
        Self {
            name: &parameter.name,
            rfc_type: parameter.rfc_type,
            narrow_length: parameter.narrow_length,
            wide_length: parameter.wide_length,
            decimals: parameter.decimals,
            type_description: parameter.type_description.as_ref(),
        }
    }
}

/// Per-session codec settings, passed by value down the call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    pub policy: WrapPolicy,
    pub decimal_separator: char,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

impl From<&ConnectionConfig> for CodecOptions {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            policy: config.policy(),
            decimal_separator: config.decimal_separator,
        }
    }
}

/// Fills every supplied parameter of a function call.
///
/// # Errors
///
/// - `RFC_INVALID_PARAMETER` backend error for a name the function does not
///   declare
/// - any fill error of a parameter, wrapped with the parameter name
pub fn fill_parameters(
    container: &mut dyn Container,
    description: &FunctionDescription,
    params: &Record,
    options: CodecOptions,
) -> Result<()> {
    for (name, value) in params {
        let parameter = description
            .parameter(name)
            .ok_or_else(|| ErrorInfo::field_not_found(name))?;
        fill_value(container, FieldSpec::from(parameter), value, options).in_field(name)?;
    }
    Ok(())
}

/// Wraps the function's parameters into a result map.
///
/// `IMPORT` parameters are left out unless the `return_import_params`
/// policy is set.
pub fn wrap_result(
    container: &mut dyn Container,
    description: &FunctionDescription,
    options: CodecOptions,
) -> Result<Record> {
    let mut result = Record::new();
    for parameter in description.parameters() {
        if parameter.direction == Direction::Import && !options.policy.return_import_params() {
            continue;
        }
        let value = wrap_value(container, FieldSpec::from(parameter), options)
            .in_field(&parameter.name)?;
        result.insert(parameter.name.clone(), value);
    }
    Ok(result)
}

/// Fills the fields of a structure or table row from a mapping.
fn fill_structure(
    container: &mut dyn Container,
    line: &TypeDescription,
    record: &Record,
    options: CodecOptions,
) -> Result<()> {
    for (name, value) in record {
        let field = line
            .field(name)
            .ok_or_else(|| ErrorInfo::field_not_found(name))?;
        fill_value(container, FieldSpec::from(field), value, options).in_field(name)?;
    }
    Ok(())
}

/// Wraps a structure or table row; a single unnamed field collapses to its
/// bare value.
fn wrap_structure(
    container: &mut dyn Container,
    line: &TypeDescription,
    options: CodecOptions,
) -> Result<Value> {
    if line.is_scalar_wrapper() {
        return wrap_value(container, FieldSpec::from(&line.fields()[0]), options);
    }
    let mut record = Record::new();
    for field in line.fields() {
        let value = wrap_value(container, FieldSpec::from(field), options).in_field(&field.name)?;
        record.insert(field.name.clone(), value);
    }
    Ok(Value::Structure(record))
}

#[cfg(test)]
mod tests;
