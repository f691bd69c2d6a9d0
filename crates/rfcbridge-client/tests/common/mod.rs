//! Shared fixture: an in-memory backend with a handful of function modules.

#![allow(dead_code)]

use std::sync::Arc;

use rfcbridge_client::backend::{Container, MemoryBackend};
use rfcbridge_client::{CallOptions, Connection};
use rfcbridge_common::{
    ConnectionConfig, ConnectionParams, Direction, ErrorInfo, FunctionDescription,
    ParameterDescriptor, Record, Result, ReturnCode, RfcType, TypeDescription,
};
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn params() -> ConnectionParams {
    ConnectionParams::new()
        .with("ashost", "10.0.0.1")
        .with("sysnr", "00")
        .with("client", "100")
        .with("user", "demo")
        .with("passwd", "secret")
        .with("lang", "en")
}

pub fn rfctest() -> Arc<TypeDescription> {
    TypeDescription::builder("RFCTEST")
        .field("RFCFLOAT", RfcType::Float, 8, 8)
        .field("RFCCHAR1", RfcType::Char, 1, 2)
        .field("RFCINT2", RfcType::Int2, 2, 2)
        .field("RFCINT1", RfcType::Int1, 1, 1)
        .field("RFCCHAR4", RfcType::Char, 4, 8)
        .field("RFCINT4", RfcType::Int, 4, 4)
        .field("RFCHEX3", RfcType::Byte, 3, 3)
        .field("RFCTIME", RfcType::Time, 6, 12)
        .field("RFCDATE", RfcType::Date, 8, 16)
        .field("RFCDATA1", RfcType::Char, 50, 100)
        .build()
        .expect("RFCTEST is a valid type")
}

fn char_param(name: &str, direction: Direction, length: usize) -> ParameterDescriptor {
    ParameterDescriptor::new(name, RfcType::Char, direction, length, length * 2)
}

fn nested_param(name: &str, rfc_type: RfcType, direction: Direction) -> ParameterDescriptor {
    ParameterDescriptor::nested(name, rfc_type, direction, rfctest())
}

fn amount_param(name: &str, direction: Direction) -> ParameterDescriptor {
    ParameterDescriptor::new(name, RfcType::Bcd, direction, 8, 8).with_decimals(2)
}

fn describe(name: &str, parameters: Vec<ParameterDescriptor>) -> FunctionDescription {
    parameters
        .into_iter()
        .fold(FunctionDescription::new(name).expect("valid name"), |desc, p| {
            desc.with_parameter(p).expect("valid parameter")
        })
}

pub fn stfc_connection() -> FunctionDescription {
    describe(
        "STFC_CONNECTION",
        vec![
            char_param("REQUTEXT", Direction::Import, 255),
            char_param("ECHOTEXT", Direction::Export, 255),
            char_param("RESPTEXT", Direction::Export, 255),
        ],
    )
}

pub fn stfc_structure() -> FunctionDescription {
    describe(
        "STFC_STRUCTURE",
        vec![
            nested_param("IMPORTSTRUCT", RfcType::Structure, Direction::Import),
            nested_param("ECHOSTRUCT", RfcType::Structure, Direction::Export),
            nested_param("RFCTABLE", RfcType::Table, Direction::Table),
            char_param("RESPTEXT", Direction::Export, 255),
        ],
    )
}

pub fn z_dates() -> FunctionDescription {
    describe(
        "Z_DATES",
        vec![
            ParameterDescriptor::new("IV_DATE", RfcType::Date, Direction::Import, 8, 16),
            ParameterDescriptor::new("IV_TIME", RfcType::Time, Direction::Import, 6, 12),
            ParameterDescriptor::new("EV_DATE", RfcType::Date, Direction::Export, 8, 16),
            ParameterDescriptor::new("EV_TIME", RfcType::Time, Direction::Export, 6, 12),
        ],
    )
}

pub fn z_amount() -> FunctionDescription {
    describe(
        "Z_AMOUNT",
        vec![
            amount_param("IV_AMOUNT", Direction::Import),
            amount_param("EV_AMOUNT", Direction::Export),
        ],
    )
}

pub fn z_big() -> FunctionDescription {
    describe(
        "Z_BIG",
        vec![
            nested_param("ET_LINES", RfcType::Table, Direction::Table),
            ParameterDescriptor::new("EV_FILLED", RfcType::Char, Direction::Export, 1, 2),
        ],
    )
}

pub fn z_link_down() -> FunctionDescription {
    describe("Z_LINK_DOWN", Vec::new())
}

pub fn z_raise() -> FunctionDescription {
    describe("Z_RAISE", Vec::new())
}

const RESPTEXT: &str = "SAP R/3 Rel. 753   Sysid: MEM      Date: 20240115";

/// Backend with every fixture function registered.
pub fn backend() -> MemoryBackend {
    MemoryBackend::new()
        .with_function(stfc_connection(), |params| {
            params.copy_field("REQUTEXT", "ECHOTEXT")?;
            params.set_chars("RESPTEXT", RESPTEXT)
        })
        .with_function(stfc_structure(), |params| {
            params.copy_field("IMPORTSTRUCT", "ECHOSTRUCT")?;
            let row = params.nested("IMPORTSTRUCT")?.clone();
            params.memory_table_mut("RFCTABLE")?.push_copy(row);
            params.set_chars("RESPTEXT", "SAP R/3 Rel. 753")
        })
        .with_function(z_dates(), |params| {
            params.copy_field("IV_DATE", "EV_DATE")?;
            params.copy_field("IV_TIME", "EV_TIME")
        })
        .with_function(z_amount(), |params| params.copy_field("IV_AMOUNT", "EV_AMOUNT"))
        .with_function(z_big(), |params| {
            if !params.is_active("ET_LINES") {
                return params.set_chars("EV_FILLED", "N");
            }
            let table = params.memory_table_mut("ET_LINES")?;
            for _ in 0..3 {
                table.push_row().set_chars("RFCCHAR4", "ROW")?;
            }
            params.set_chars("EV_FILLED", "X")
        })
        .with_function(z_link_down(), |_| {
            Err(ErrorInfo::new(
                ReturnCode::CommunicationFailure,
                "connection closed by partner",
            ))
        })
        .with_function(z_raise(), |_| {
            Err(ErrorInfo::new(ReturnCode::AbapException, "Z_RAISE raised NOT_FOUND")
                .with_key("NOT_FOUND"))
        })
}

pub fn connect() -> Connection<MemoryBackend> {
    connect_with(ConnectionConfig::default())
}

pub fn connect_with(config: ConnectionConfig) -> Connection<MemoryBackend> {
    init_tracing();
    Connection::open(backend(), params(), config).expect("in-memory logon succeeds")
}

/// Calls `name` with default options.
pub fn call(conn: &mut Connection<MemoryBackend>, name: &str, params: &Record) -> Result<Record> {
    conn.call(name, &CallOptions::new(), params)
}

pub fn call_empty(conn: &mut Connection<MemoryBackend>, name: &str) -> Result<Record> {
    call(conn, name, &Record::new())
}
