//! In-memory backend.
//!
//! A deterministic [`RfcBackend`] for tests and demos. Functions are
//! registered together with a handler closure that plays the remote
//! function module: it reads the filled parameter container and writes the
//! results back into it.
//!
//! Field storage follows the real library closely enough for the codec to
//! be exercised end to end: `CHAR` fields are blank-padded, `NUM` fields
//! zero-padded, `BYTE` fields zero-filled to their declared length, and
//! `DATE`/`TIME` fields start out as `00000000`/`000000`. Transactions and
//! background units only execute their calls when submitted, and a
//! transaction id is never executed twice.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use bigdecimal::BigDecimal;
use tracing::debug;

use rfcbridge_common::protocol::unit::{TRANSACTION_ID_LENGTH, UNIT_ID_LENGTH};
use rfcbridge_common::{
    ConnectionParams, ErrorGroup, ErrorInfo, FunctionDescription, ReturnCode, RfcType,
    TypeDescription, UnitAttributes, UnitIdentifier, UnitState, UnitType,
};

use super::{
    BackendResult, ConnectionAttributes, Container, FunctionContainer, LibraryVersion, ReadStatus,
    RfcBackend, Table, TransactionHandle, UnitHandle,
};

/// Remote function body run by [`MemoryBackend`].
pub type Handler = Arc<dyn Fn(&mut MemoryContainer) -> BackendResult<()> + Send + Sync>;

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const DEFAULT_SYSID: &str = "MEM";

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Bytes(Vec<u8>),
    Float(f64),
    Int(i64),
    Structure(Box<MemoryContainer>),
    Table(MemoryTable),
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    name: String,
    rfc_type: RfcType,
    length: usize,
    decimals: u32,
    active: bool,
    cell: Cell,
}

impl Slot {
    fn new(
        name: &str,
        rfc_type: RfcType,
        length: usize,
        decimals: u32,
        line: Option<&Arc<TypeDescription>>,
    ) -> Self {
        let cell = match rfc_type {
            RfcType::Char => Cell::Text(" ".repeat(length)),
            RfcType::Num => Cell::Text("0".repeat(length)),
            RfcType::String => Cell::Text(String::new()),
            RfcType::Date => Cell::Text("00000000".to_string()),
            RfcType::Time => Cell::Text("000000".to_string()),
            RfcType::Bcd | RfcType::Decf16 | RfcType::Decf34 => Cell::Text("0".to_string()),
            RfcType::Byte => Cell::Bytes(vec![0; length]),
            RfcType::Xstring => Cell::Bytes(Vec::new()),
            RfcType::Float => Cell::Float(0.0),
            RfcType::Int | RfcType::Int1 | RfcType::Int2 | RfcType::Int8 => Cell::Int(0),
            RfcType::Structure => {
                let inner = line.map(|l| MemoryContainer::for_type(l));
                Cell::Structure(Box::new(inner.unwrap_or_default()))
            }
            RfcType::Table => Cell::Table(MemoryTable::new(line.cloned())),
        };
        Self {
            name: name.to_string(),
            rfc_type,
            length,
            decimals,
            active: true,
            cell,
        }
    }

    fn mismatch(&self) -> ErrorInfo {
        ErrorInfo::new(
            ReturnCode::ConversionFailure,
            format!("field '{}' has type {}", self.name, self.rfc_type),
        )
    }

    fn text(&self) -> BackendResult<String> {
        match &self.cell {
            Cell::Text(text) => Ok(text.clone()),
            _ => Err(self.mismatch()),
        }
    }

    fn bytes(&self) -> BackendResult<&[u8]> {
        match &self.cell {
            Cell::Bytes(bytes) => Ok(bytes.as_slice()),
            _ => Err(self.mismatch()),
        }
    }

    fn int(&self) -> BackendResult<i64> {
        match self.cell {
            Cell::Int(i) => Ok(i),
            _ => Err(self.mismatch()),
        }
    }
}

/// Parameter list, structure or table row held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryContainer {
    name: String,
    slots: Vec<Slot>,
}

impl MemoryContainer {
    /// Initialised container for a structure or table line type.
    pub fn for_type(description: &TypeDescription) -> Self {
        Self {
            name: description.name().to_string(),
            slots: description
                .fields()
                .iter()
                .map(|f| {
                    Slot::new(
                        &f.name,
                        f.rfc_type,
                        f.narrow_length,
                        f.decimals,
                        f.type_description.as_ref(),
                    )
                })
                .collect(),
        }
    }

    /// Initialised parameter list of a function.
    pub fn for_function(description: &FunctionDescription) -> Self {
        Self {
            name: description.name().to_string(),
            slots: description
                .parameters()
                .iter()
                .map(|p| {
                    Slot::new(
                        &p.name,
                        p.rfc_type,
                        p.narrow_length,
                        p.decimals,
                        p.type_description.as_ref(),
                    )
                })
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the caller requested this parameter.
    pub fn is_active(&self, field: &str) -> bool {
        self.slots
            .iter()
            .find(|s| s.name == field)
            .map(|s| s.active)
            .unwrap_or(false)
    }

    /// Copies a field's content onto another field of the same type.
    pub fn copy_field(&mut self, source: &str, target: &str) -> BackendResult<()> {
        let cell = {
            let from = self.slot(source)?;
            let to = self.slot(target)?;
            if from.rfc_type != to.rfc_type {
                return Err(to.mismatch());
            }
            from.cell.clone()
        };
        self.slot_mut(target)?.cell = cell;
        Ok(())
    }

    pub fn nested(&self, field: &str) -> BackendResult<&MemoryContainer> {
        let slot = self.slot(field)?;
        match &slot.cell {
            Cell::Structure(inner) => Ok(&**inner),
            _ => Err(slot.mismatch()),
        }
    }

    pub fn nested_mut(&mut self, field: &str) -> BackendResult<&mut MemoryContainer> {
        let slot = self.slot_mut(field)?;
        match slot.cell {
            Cell::Structure(ref mut inner) => Ok(&mut **inner),
            _ => Err(slot.mismatch()),
        }
    }

    pub fn rows(&self, field: &str) -> BackendResult<&[MemoryContainer]> {
        let slot = self.slot(field)?;
        match &slot.cell {
            Cell::Table(table) => Ok(table.rows.as_slice()),
            _ => Err(slot.mismatch()),
        }
    }

    pub fn memory_table_mut(&mut self, field: &str) -> BackendResult<&mut MemoryTable> {
        let slot = self.slot_mut(field)?;
        match slot.cell {
            Cell::Table(ref mut table) => Ok(table),
            _ => Err(slot.mismatch()),
        }
    }

    fn slot(&self, field: &str) -> BackendResult<&Slot> {
        self.slots
            .iter()
            .find(|s| s.name == field)
            .ok_or_else(|| ErrorInfo::field_not_found(field))
    }

    fn slot_mut(&mut self, field: &str) -> BackendResult<&mut Slot> {
        self.slots
            .iter_mut()
            .find(|s| s.name == field)
            .ok_or_else(|| ErrorInfo::field_not_found(field))
    }

    fn typed(&self, field: &str, accepted: &[RfcType]) -> BackendResult<&Slot> {
        let slot = self.slot(field)?;
        if !accepted.contains(&slot.rfc_type) {
            return Err(slot.mismatch());
        }
        Ok(slot)
    }

    fn typed_mut(&mut self, field: &str, accepted: &[RfcType]) -> BackendResult<&mut Slot> {
        let slot = self.slot_mut(field)?;
        if !accepted.contains(&slot.rfc_type) {
            return Err(slot.mismatch());
        }
        Ok(slot)
    }

    fn set_fixed_text(
        &mut self,
        field: &str,
        rfc_type: RfcType,
        value: &str,
        width: Option<usize>,
    ) -> BackendResult<()> {
        let slot = self.typed_mut(field, &[rfc_type])?;
        let width = width.unwrap_or(slot.length);
        let mut text: String = value.chars().take(width).collect();
        let pad = width - text.chars().count();
        text.extend(std::iter::repeat(' ').take(pad));
        slot.cell = Cell::Text(text);
        Ok(())
    }
}

const DECIMAL_TYPES: [RfcType; 4] = [
    RfcType::Bcd,
    RfcType::Float,
    RfcType::Decf16,
    RfcType::Decf34,
];
const INT_TYPES: [RfcType; 3] = [RfcType::Int, RfcType::Int1, RfcType::Int2];

fn conversion_failure(field: &str, rfc_type: RfcType, value: &str) -> ErrorInfo {
    ErrorInfo::new(
        ReturnCode::ConversionFailure,
        format!(
            "Cannot convert value {:?} for the field {} to type {}",
            value, field, rfc_type
        ),
    )
}

fn copy_into(buffer: &mut [u8], data: &[u8]) -> ReadStatus {
    if buffer.len() < data.len() {
        return ReadStatus::BufferTooSmall {
            required: data.len(),
        };
    }
    buffer[..data.len()].copy_from_slice(data);
    ReadStatus::Complete(data.len())
}

impl Container for MemoryContainer {
    fn set_chars(&mut self, field: &str, value: &str) -> BackendResult<()> {
        self.set_fixed_text(field, RfcType::Char, value, None)
    }

    fn set_string(&mut self, field: &str, value: &str) -> BackendResult<()> {
        let slot = self.typed_mut(field, &[RfcType::String])?;
        slot.cell = Cell::Text(value.to_string());
        Ok(())
    }

    fn set_num(&mut self, field: &str, digits: &str) -> BackendResult<()> {
        let slot = self.typed_mut(field, &[RfcType::Num])?;
        if !digits.chars().all(|c| c.is_ascii_digit()) || digits.len() > slot.length {
            return Err(conversion_failure(field, RfcType::Num, digits));
        }
        slot.cell = Cell::Text(format!("{:0>width$}", digits, width = slot.length));
        Ok(())
    }

    fn set_bytes(&mut self, field: &str, value: &[u8]) -> BackendResult<()> {
        let slot = self.typed_mut(field, &[RfcType::Byte])?;
        let mut bytes = value.to_vec();
        bytes.resize(slot.length, 0);
        slot.cell = Cell::Bytes(bytes);
        Ok(())
    }

    fn set_xstring(&mut self, field: &str, value: &[u8]) -> BackendResult<()> {
        let slot = self.typed_mut(field, &[RfcType::Xstring])?;
        slot.cell = Cell::Bytes(value.to_vec());
        Ok(())
    }

    fn set_decimal_text(&mut self, field: &str, text: &str) -> BackendResult<()> {
        let slot = self.typed_mut(field, &DECIMAL_TYPES)?;
        // Either radix character is accepted.
        let normalized = text.trim().replace(',', ".");
        let parsed = BigDecimal::from_str(&normalized)
            .map_err(|_| conversion_failure(field, slot.rfc_type, text))?;
        slot.cell = match slot.rfc_type {
            RfcType::Float => Cell::Float(
                normalized
                    .parse::<f64>()
                    .map_err(|_| conversion_failure(field, RfcType::Float, text))?,
            ),
            RfcType::Bcd if slot.decimals > 0 => {
                let scale = i64::from(slot.decimals);
                Cell::Text(parsed.round(scale).with_scale(scale).to_string())
            }
            _ => Cell::Text(normalized),
        };
        Ok(())
    }

    fn set_int(&mut self, field: &str, value: i32) -> BackendResult<()> {
        let slot = self.typed_mut(field, &INT_TYPES)?;
        let in_range = match slot.rfc_type {
            RfcType::Int1 => u8::try_from(value).is_ok(),
            RfcType::Int2 => i16::try_from(value).is_ok(),
            _ => true,
        };
        if !in_range {
            return Err(conversion_failure(field, slot.rfc_type, &value.to_string()));
        }
        slot.cell = Cell::Int(i64::from(value));
        Ok(())
    }

    fn set_int8(&mut self, field: &str, value: i64) -> BackendResult<()> {
        let slot = self.typed_mut(field, &[RfcType::Int8])?;
        slot.cell = Cell::Int(value);
        Ok(())
    }

    fn set_date(&mut self, field: &str, yyyymmdd: &str) -> BackendResult<()> {
        self.set_fixed_text(field, RfcType::Date, yyyymmdd, Some(8))
    }

    fn set_time(&mut self, field: &str, hhmmss: &str) -> BackendResult<()> {
        self.set_fixed_text(field, RfcType::Time, hhmmss, Some(6))
    }

    fn chars(&self, field: &str) -> BackendResult<String> {
        self.typed(field, &[RfcType::Char])?.text()
    }

    fn num(&self, field: &str) -> BackendResult<String> {
        self.typed(field, &[RfcType::Num])?.text()
    }

    fn string_length(&self, field: &str) -> BackendResult<usize> {
        Ok(self.typed(field, &[RfcType::String])?.text()?.len())
    }

    fn read_string(&self, field: &str, buffer: &mut [u8]) -> BackendResult<ReadStatus> {
        let text = self.typed(field, &[RfcType::String])?.text()?;
        Ok(copy_into(buffer, text.as_bytes()))
    }

    fn read_bytes(&self, field: &str, buffer: &mut [u8]) -> BackendResult<ReadStatus> {
        let slot = self.typed(field, &[RfcType::Byte])?;
        Ok(copy_into(buffer, slot.bytes()?))
    }

    fn xstring_length(&self, field: &str) -> BackendResult<usize> {
        Ok(self.typed(field, &[RfcType::Xstring])?.bytes()?.len())
    }

    fn read_xstring(&self, field: &str, buffer: &mut [u8]) -> BackendResult<ReadStatus> {
        let slot = self.typed(field, &[RfcType::Xstring])?;
        Ok(copy_into(buffer, slot.bytes()?))
    }

    fn read_decimal_text(&self, field: &str, buffer: &mut [u8]) -> BackendResult<ReadStatus> {
        let slot = self.typed(field, &DECIMAL_TYPES)?;
        let text = match &slot.cell {
            Cell::Float(f) => f.to_string(),
            _ => slot.text()?,
        };
        Ok(copy_into(buffer, text.as_bytes()))
    }

    fn float(&self, field: &str) -> BackendResult<f64> {
        let slot = self.typed(field, &[RfcType::Float])?;
        match slot.cell {
            Cell::Float(f) => Ok(f),
            _ => Err(slot.mismatch()),
        }
    }

    fn int(&self, field: &str) -> BackendResult<i32> {
        let slot = self.typed(field, &[RfcType::Int])?;
        i32::try_from(slot.int()?).map_err(|_| slot.mismatch())
    }

    fn int1(&self, field: &str) -> BackendResult<u8> {
        let slot = self.typed(field, &[RfcType::Int1])?;
        u8::try_from(slot.int()?).map_err(|_| slot.mismatch())
    }

    fn int2(&self, field: &str) -> BackendResult<i16> {
        let slot = self.typed(field, &[RfcType::Int2])?;
        i16::try_from(slot.int()?).map_err(|_| slot.mismatch())
    }

    fn int8(&self, field: &str) -> BackendResult<i64> {
        self.typed(field, &[RfcType::Int8])?.int()
    }

    fn date(&self, field: &str) -> BackendResult<String> {
        self.typed(field, &[RfcType::Date])?.text()
    }

    fn time(&self, field: &str) -> BackendResult<String> {
        self.typed(field, &[RfcType::Time])?.text()
    }

    fn structure_mut(&mut self, field: &str) -> BackendResult<&mut dyn Container> {
        let inner: &mut dyn Container = self.nested_mut(field)?;
        Ok(inner)
    }

    fn table_mut(&mut self, field: &str) -> BackendResult<&mut dyn Table> {
        let table: &mut dyn Table = self.memory_table_mut(field)?;
        Ok(table)
    }
}

/// Rows of a table field or parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    line: Option<Arc<TypeDescription>>,
    rows: Vec<MemoryContainer>,
}

impl MemoryTable {
    pub fn new(line: Option<Arc<TypeDescription>>) -> Self {
        Self {
            line,
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[MemoryContainer] {
        &self.rows
    }

    /// Appends an initialised row and returns its concrete container.
    pub fn push_row(&mut self) -> &mut MemoryContainer {
        let row = self
            .line
            .as_deref()
            .map(MemoryContainer::for_type)
            .unwrap_or_default();
        self.rows.push(row);
        let last = self.rows.len() - 1;
        &mut self.rows[last]
    }

    /// Appends a copy of an existing row.
    pub fn push_copy(&mut self, row: MemoryContainer) {
        self.rows.push(row);
    }

    pub fn row(&self, index: usize) -> BackendResult<&MemoryContainer> {
        self.rows.get(index).ok_or_else(|| out_of_range(index))
    }
}

fn out_of_range(index: usize) -> ErrorInfo {
    ErrorInfo::new(
        ReturnCode::TableMoveEof,
        format!("row {} is past the end of the table", index),
    )
}

impl Table for MemoryTable {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn append_row(&mut self) -> BackendResult<&mut dyn Container> {
        let row: &mut dyn Container = self.push_row();
        Ok(row)
    }

    fn row_mut(&mut self, index: usize) -> BackendResult<&mut dyn Container> {
        let row: &mut dyn Container = self
            .rows
            .get_mut(index)
            .ok_or_else(|| out_of_range(index))?;
        Ok(row)
    }

    fn delete_row(&mut self, index: usize) -> BackendResult<()> {
        if index >= self.rows.len() {
            return Err(out_of_range(index));
        }
        self.rows.remove(index);
        Ok(())
    }
}

/// Parameter container of one invocation; counted while alive.
#[derive(Debug)]
pub struct MemoryFunction {
    description: Arc<FunctionDescription>,
    params: MemoryContainer,
    live: Arc<AtomicUsize>,
}

impl MemoryFunction {
    fn new(description: Arc<FunctionDescription>, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            params: MemoryContainer::for_function(&description),
            description,
            live,
        }
    }

    pub fn description(&self) -> &FunctionDescription {
        &self.description
    }

    pub fn container(&self) -> &MemoryContainer {
        &self.params
    }
}

impl Drop for MemoryFunction {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FunctionContainer for MemoryFunction {
    fn function_name(&self) -> &str {
        self.description.name()
    }

    fn parameters(&self) -> &dyn Container {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut dyn Container {
        &mut self.params
    }

    fn set_active(&mut self, parameter: &str, active: bool) -> BackendResult<()> {
        self.params.slot_mut(parameter)?.active = active;
        Ok(())
    }
}

struct Registration {
    description: Arc<FunctionDescription>,
    handler: Handler,
}

/// Calls recorded for a transaction or unit, executed on submit.
#[derive(Default)]
struct PendingCalls {
    calls: Vec<(String, MemoryContainer)>,
    submitted: bool,
}

struct PendingTransaction {
    tid: String,
    queue: Option<String>,
    pending: PendingCalls,
}

struct PendingUnit {
    identifier: UnitIdentifier,
    pending: PendingCalls,
}

/// In-memory [`RfcBackend`].
///
/// # Example
///
/// ```
/// use rfcbridge_client::backend::{Container, MemoryBackend};
/// use rfcbridge_common::{Direction, FunctionDescription, ParameterDescriptor, RfcType};
///
/// let echo = FunctionDescription::new("Z_ECHO")
///     .unwrap()
///     .with_parameter(ParameterDescriptor::new("IN", RfcType::String, Direction::Import, 0, 0))
///     .unwrap()
///     .with_parameter(ParameterDescriptor::new("OUT", RfcType::String, Direction::Export, 0, 0))
///     .unwrap();
///
/// let backend = MemoryBackend::new().with_function(echo, |params| {
///     let len = params.string_length("IN")?;
///     let mut buf = vec![0u8; len];
///     params.read_string("IN", &mut buf)?;
///     params.set_string("OUT", &String::from_utf8_lossy(&buf))
/// });
/// assert_eq!(backend.live_containers(), 0);
/// ```
pub struct MemoryBackend {
    sysid: String,
    open: bool,
    params: Option<ConnectionParams>,
    logon_error: Option<ErrorInfo>,
    logons: usize,
    functions: HashMap<String, Registration>,
    function_cache: HashMap<(String, String), Arc<FunctionDescription>>,
    type_cache: HashMap<(String, String), Arc<TypeDescription>>,
    next_handle: u64,
    transactions: HashMap<u64, PendingTransaction>,
    executed_tids: HashSet<String>,
    units: HashMap<u64, PendingUnit>,
    unit_states: HashMap<String, UnitState>,
    unit_attributes: HashMap<String, UnitAttributes>,
    queued_units: Vec<(String, Vec<(String, MemoryContainer)>)>,
    executions: Vec<String>,
    live: Arc<AtomicUsize>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates a backend that knows only `RFC_PING`.
    pub fn new() -> Self {
        let mut backend = Self {
            sysid: DEFAULT_SYSID.to_string(),
            open: false,
            params: None,
            logon_error: None,
            logons: 0,
            functions: HashMap::new(),
            function_cache: HashMap::new(),
            type_cache: HashMap::new(),
            next_handle: 1,
            transactions: HashMap::new(),
            executed_tids: HashSet::new(),
            units: HashMap::new(),
            unit_states: HashMap::new(),
            unit_attributes: HashMap::new(),
            queued_units: Vec::new(),
            executions: Vec::new(),
            live: Arc::new(AtomicUsize::new(0)),
        };
        if let Ok(ping) = FunctionDescription::new("RFC_PING") {
            backend.register(ping, |_| Ok(()));
        }
        backend
    }

    pub fn with_sysid(mut self, sysid: impl Into<String>) -> Self {
        self.sysid = sysid.into();
        self
    }

    /// Makes every logon attempt fail with `error`.
    pub fn with_logon_error(mut self, error: ErrorInfo) -> Self {
        self.logon_error = Some(error);
        self
    }

    pub fn with_function<F>(mut self, description: FunctionDescription, handler: F) -> Self
    where
        F: Fn(&mut MemoryContainer) -> BackendResult<()> + Send + Sync + 'static,
    {
        self.register(description, handler);
        self
    }

    pub fn register<F>(&mut self, description: FunctionDescription, handler: F)
    where
        F: Fn(&mut MemoryContainer) -> BackendResult<()> + Send + Sync + 'static,
    {
        let name = description.name().to_string();
        self.functions.insert(
            name,
            Registration {
                description: Arc::new(description),
                handler: Arc::new(handler),
            },
        );
    }

    pub fn sysid(&self) -> &str {
        &self.sysid
    }

    /// Number of function containers not yet released.
    pub fn live_containers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Successful logons so far.
    pub fn logons(&self) -> usize {
        self.logons
    }

    /// Names of executed function modules, in execution order.
    pub fn executions(&self) -> &[String] {
        &self.executions
    }

    /// Sender attributes the background unit `id` was created with.
    pub fn unit_attributes(&self, id: &str) -> Option<&UnitAttributes> {
        self.unit_attributes.get(id)
    }

    /// Simulates the link dropping without a close.
    pub fn drop_link(&mut self) {
        self.open = false;
    }

    /// Drops every transaction and unit handle on the backend side.
    pub fn release_unit_handles(&mut self) {
        self.transactions.clear();
        self.units.clear();
    }

    /// Runs submitted queued background units, as the backend scheduler would.
    ///
    /// Returns the number of units processed.
    pub fn process_queues(&mut self) -> usize {
        let queued = std::mem::take(&mut self.queued_units);
        let count = queued.len();
        for (id, mut calls) in queued {
            let state = match self.execute_all(&mut calls) {
                Ok(()) => UnitState::Committed,
                Err(_) => UnitState::RolledBack,
            };
            debug!(unit_id = %id, state = %state, "Processed queued unit");
            self.unit_states.insert(id, state);
        }
        count
    }

    fn ensure_open(&self) -> BackendResult<()> {
        if !self.open {
            return Err(ErrorInfo::invalid_handle());
        }
        Ok(())
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn registration(&self, name: &str) -> BackendResult<&Registration> {
        self.functions
            .get(name)
            .ok_or_else(|| function_not_found(name))
    }

    fn execute(&mut self, name: &str, container: &mut MemoryContainer) -> BackendResult<()> {
        let handler = self.registration(name)?.handler.clone();
        if let Err(error) = handler(container) {
            if matches!(
                error.group,
                ErrorGroup::CommunicationFailure
                    | ErrorGroup::LogonFailure
                    | ErrorGroup::AbapRuntimeFailure
            ) {
                self.open = false;
            }
            return Err(error);
        }
        self.executions.push(name.to_string());
        Ok(())
    }

    fn execute_all(&mut self, calls: &mut [(String, MemoryContainer)]) -> BackendResult<()> {
        for (name, container) in calls.iter_mut() {
            self.execute(name, container)?;
        }
        Ok(())
    }

    fn cache_types(&mut self, line: &Arc<TypeDescription>) {
        let key = (self.sysid.clone(), line.name().to_string());
        if self.type_cache.insert(key, line.clone()).is_none() {
            for field in line.fields() {
                if let Some(nested) = &field.type_description {
                    self.cache_types(nested);
                }
            }
        }
    }

    fn generate_id(width: usize) -> String {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let counter = ID_COUNTER.fetch_add(1, Ordering::SeqCst);
        let id = format!("{:016X}{:016X}", counter, timestamp);
        id[id.len() - width..].to_string()
    }
}

fn function_not_found(name: &str) -> ErrorInfo {
    ErrorInfo::new(
        ReturnCode::AbapException,
        format!("ID:FL Type:E Number:046 {}", name),
    )
    .with_key("FU_NOT_FOUND")
    .with_abap_message("FL", "E", "046")
    .with_message_vars([name, "", "", ""])
}

fn not_cached(kind: &str, sysid: &str, name: &str) -> ErrorInfo {
    ErrorInfo::new(
        ReturnCode::NotFound,
        format!(
            "No {} description for {} cached for system {}",
            kind, name, sysid
        ),
    )
}

impl RfcBackend for MemoryBackend {
    type Function = MemoryFunction;

    fn open(&mut self, params: &ConnectionParams) -> BackendResult<()> {
        if let Some(error) = &self.logon_error {
            return Err(error.clone());
        }
        if ["ashost", "gwhost", "mshost", "dest"]
            .iter()
            .all(|key| params.get(key).is_none())
        {
            return Err(ErrorInfo::new(
                ReturnCode::InvalidParameter,
                "Parameter ASHOST, GWHOST, MSHOST or SERVER_PORT is missing.",
            ));
        }
        self.params = Some(params.clone());
        self.open = true;
        self.logons += 1;
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn ping(&mut self) -> BackendResult<()> {
        self.ensure_open()
    }

    fn function_description(&mut self, name: &str) -> BackendResult<Arc<FunctionDescription>> {
        self.ensure_open()?;
        let description = self.registration(name)?.description.clone();
        let key = (self.sysid.clone(), name.to_string());
        self.function_cache.insert(key, description.clone());
        for parameter in description.parameters() {
            if let Some(line) = &parameter.type_description {
                self.cache_types(line);
            }
        }
        Ok(description)
    }

    fn create_function(
        &mut self,
        description: &Arc<FunctionDescription>,
    ) -> BackendResult<MemoryFunction> {
        Ok(MemoryFunction::new(description.clone(), self.live.clone()))
    }

    fn invoke(&mut self, function: &mut MemoryFunction) -> BackendResult<()> {
        self.ensure_open()?;
        let name = function.description.name().to_string();
        self.execute(&name, &mut function.params)
    }

    fn transaction_id(&mut self) -> BackendResult<String> {
        self.ensure_open()?;
        Ok(Self::generate_id(TRANSACTION_ID_LENGTH))
    }

    fn create_transaction(
        &mut self,
        tid: &str,
        queue: Option<&str>,
    ) -> BackendResult<TransactionHandle> {
        self.ensure_open()?;
        let handle = self.next_handle();
        self.transactions.insert(
            handle,
            PendingTransaction {
                tid: tid.to_string(),
                queue: queue.map(str::to_string),
                pending: PendingCalls::default(),
            },
        );
        Ok(TransactionHandle(handle))
    }

    fn invoke_in_transaction(
        &mut self,
        handle: TransactionHandle,
        function: &mut MemoryFunction,
    ) -> BackendResult<()> {
        self.ensure_open()?;
        let name = function.description.name().to_string();
        self.registration(&name)?;
        let transaction = self
            .transactions
            .get_mut(&handle.0)
            .ok_or_else(ErrorInfo::invalid_handle)?;
        if transaction.pending.submitted {
            return Err(ErrorInfo::new(
                ReturnCode::IllegalState,
                "transaction already submitted",
            ));
        }
        transaction.pending.calls.push((name, function.params.clone()));
        Ok(())
    }

    fn submit_transaction(&mut self, handle: TransactionHandle) -> BackendResult<()> {
        self.ensure_open()?;
        let transaction = self
            .transactions
            .get_mut(&handle.0)
            .ok_or_else(ErrorInfo::invalid_handle)?;
        transaction.pending.submitted = true;
        let tid = transaction.tid.clone();
        let queue = transaction.queue.clone();
        let mut calls = std::mem::take(&mut transaction.pending.calls);
        if self.executed_tids.contains(&tid) {
            debug!(tid = %tid, "Transaction already executed");
            return Ok(());
        }
        self.execute_all(&mut calls)?;
        debug!(tid = %tid, queue = ?queue, calls = calls.len(), "Executed transaction");
        self.executed_tids.insert(tid);
        Ok(())
    }

    fn confirm_transaction(&mut self, handle: TransactionHandle) -> BackendResult<()> {
        self.ensure_open()?;
        let transaction = self
            .transactions
            .get(&handle.0)
            .ok_or_else(ErrorInfo::invalid_handle)?;
        if !transaction.pending.submitted {
            return Err(ErrorInfo::new(
                ReturnCode::IllegalState,
                "transaction not submitted",
            ));
        }
        Ok(())
    }

    fn destroy_transaction(&mut self, handle: TransactionHandle) -> BackendResult<()> {
        self.transactions
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(ErrorInfo::invalid_handle)
    }

    fn unit_id(&mut self) -> BackendResult<String> {
        self.ensure_open()?;
        Ok(Self::generate_id(UNIT_ID_LENGTH))
    }

    fn create_unit(
        &mut self,
        id: &str,
        queue_names: &[String],
        attributes: &UnitAttributes,
    ) -> BackendResult<(UnitHandle, UnitIdentifier)> {
        self.ensure_open()?;
        let identifier = UnitIdentifier::new(UnitType::for_queues(queue_names), id);
        let handle = self.next_handle();
        debug!(
            unit_id = %id,
            unit_type = %identifier.unit_type.as_char(),
            queues = queue_names.len(),
            user = %attributes.user,
            "Created background unit"
        );
        self.unit_attributes.insert(id.to_string(), attributes.clone());
        self.units.insert(
            handle,
            PendingUnit {
                identifier: identifier.clone(),
                pending: PendingCalls::default(),
            },
        );
        Ok((UnitHandle(handle), identifier))
    }

    fn invoke_in_unit(
        &mut self,
        handle: UnitHandle,
        function: &mut MemoryFunction,
    ) -> BackendResult<()> {
        self.ensure_open()?;
        let name = function.description.name().to_string();
        self.registration(&name)?;
        let unit = self
            .units
            .get_mut(&handle.0)
            .ok_or_else(ErrorInfo::invalid_handle)?;
        if unit.pending.submitted {
            return Err(ErrorInfo::new(
                ReturnCode::IllegalState,
                "unit already submitted",
            ));
        }
        unit.pending.calls.push((name, function.params.clone()));
        Ok(())
    }

    fn submit_unit(&mut self, handle: UnitHandle) -> BackendResult<()> {
        self.ensure_open()?;
        let unit = self
            .units
            .get_mut(&handle.0)
            .ok_or_else(ErrorInfo::invalid_handle)?;
        unit.pending.submitted = true;
        let identifier = unit.identifier.clone();
        let mut calls = std::mem::take(&mut unit.pending.calls);
        if self.unit_states.contains_key(&identifier.id) {
            debug!(unit_id = %identifier.id, "Unit already known to the backend");
            return Ok(());
        }
        if identifier.is_queued() {
            self.unit_states.insert(identifier.id.clone(), UnitState::InProcess);
            self.queued_units.push((identifier.id, calls));
            return Ok(());
        }
        match self.execute_all(&mut calls) {
            Ok(()) => {
                self.unit_states.insert(identifier.id, UnitState::Committed);
                Ok(())
            }
            Err(error) => {
                self.unit_states.insert(identifier.id, UnitState::RolledBack);
                Err(error)
            }
        }
    }

    fn confirm_unit(&mut self, identifier: &UnitIdentifier) -> BackendResult<()> {
        self.ensure_open()?;
        match self.unit_states.get_mut(&identifier.id) {
            Some(state) => {
                *state = UnitState::Confirmed;
                Ok(())
            }
            None => Err(ErrorInfo::new(
                ReturnCode::NotFound,
                format!("unit {} not found", identifier.id),
            )),
        }
    }

    fn destroy_unit(&mut self, handle: UnitHandle) -> BackendResult<()> {
        self.units
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(ErrorInfo::invalid_handle)
    }

    fn unit_state(&mut self, identifier: &UnitIdentifier) -> BackendResult<UnitState> {
        self.ensure_open()?;
        let state = self.unit_states.get(&identifier.id).copied();
        Ok(state.unwrap_or(UnitState::NotFound))
    }

    fn connection_attributes(&mut self) -> BackendResult<ConnectionAttributes> {
        self.ensure_open()?;
        let param = |key: &str| {
            self.params
                .as_ref()
                .and_then(|p| p.get(key))
                .unwrap_or_default()
                .to_string()
        };
        let lang = param("lang").to_uppercase();
        Ok(ConnectionAttributes {
            host: "localhost".to_string(),
            partner_host: param("ashost"),
            sys_number: param("sysnr"),
            sys_id: self.sysid.clone(),
            client: param("client"),
            user: param("user").to_uppercase(),
            language: lang.chars().take(1).collect(),
            trace: "0".to_string(),
            iso_language: lang,
            codepage: "4103".to_string(),
            partner_codepage: "4103".to_string(),
            rfc_role: "C".to_string(),
            rfc_type: "E".to_string(),
            partner_type: "3".to_string(),
            rel: "753".to_string(),
            partner_rel: "753".to_string(),
            kernel_rel: "753".to_string(),
            cpic_conv_id: format!("{:08}", self.logons),
            prog_name: "RFCBRIDGE".to_string(),
            partner_bytes_per_char: "2".to_string(),
            active_unit: false,
        })
    }

    fn cached_function_description(
        &mut self,
        sysid: &str,
        name: &str,
    ) -> BackendResult<Arc<FunctionDescription>> {
        self.function_cache
            .get(&(sysid.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_cached("function", sysid, name))
    }

    fn remove_function_description(&mut self, sysid: &str, name: &str) -> BackendResult<()> {
        self.function_cache
            .remove(&(sysid.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_cached("function", sysid, name))
    }

    fn remove_type_description(&mut self, sysid: &str, name: &str) -> BackendResult<()> {
        self.type_cache
            .remove(&(sysid.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_cached("type", sysid, name))
    }

    fn version(&self) -> LibraryVersion {
        LibraryVersion {
            major: 7,
            minor: 530,
            patch_level: 0,
        }
    }
}
