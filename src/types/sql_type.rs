use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SqlBridgeError;

/// Column and bind types as the database engine understands them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Char,
    Varchar,
    NChar,
    NVarchar,
    /// Variable length character data, equivalent to VARCHAR but unbounded.
    Long,
    Clob,
    NClob,
    Raw,
    LongRaw,
    Blob,
    Number,
    Float,
    BinaryFloat,
    BinaryDouble,
    /// Date plus time of day to the second; no fractional seconds.
    Date,
    Timestamp,
    TimestampWithTimeZone,
    TimestampWithLocalTimeZone,
    IntervalYearToMonth,
    IntervalDayToSecond,
    RowId,
    URowId,
    Json,
}

impl SqlType {
    pub const ALL: [SqlType; 23] = [
        SqlType::Char,
        SqlType::Varchar,
        SqlType::NChar,
        SqlType::NVarchar,
        SqlType::Long,
        SqlType::Clob,
        SqlType::NClob,
        SqlType::Raw,
        SqlType::LongRaw,
        SqlType::Blob,
        SqlType::Number,
        SqlType::Float,
        SqlType::BinaryFloat,
        SqlType::BinaryDouble,
        SqlType::Date,
        SqlType::Timestamp,
        SqlType::TimestampWithTimeZone,
        SqlType::TimestampWithLocalTimeZone,
        SqlType::IntervalYearToMonth,
        SqlType::IntervalDayToSecond,
        SqlType::RowId,
        SqlType::URowId,
        SqlType::Json,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SqlType::Char => "CHAR",
            SqlType::Varchar => "VARCHAR2",
            SqlType::NChar => "NCHAR",
            SqlType::NVarchar => "NVARCHAR2",
            SqlType::Long => "LONG",
            SqlType::Clob => "CLOB",
            SqlType::NClob => "NCLOB",
            SqlType::Raw => "RAW",
            SqlType::LongRaw => "LONG RAW",
            SqlType::Blob => "BLOB",
            SqlType::Number => "NUMBER",
            SqlType::Float => "FLOAT",
            SqlType::BinaryFloat => "BINARY_FLOAT",
            SqlType::BinaryDouble => "BINARY_DOUBLE",
            SqlType::Date => "DATE",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampWithTimeZone => "TIMESTAMP WITH TIME ZONE",
            SqlType::TimestampWithLocalTimeZone => "TIMESTAMP WITH LOCAL TIME ZONE",
            SqlType::IntervalYearToMonth => "INTERVAL YEAR TO MONTH",
            SqlType::IntervalDayToSecond => "INTERVAL DAY TO SECOND",
            SqlType::RowId => "ROWID",
            SqlType::URowId => "UROWID",
            SqlType::Json => "JSON",
        }
    }

    /// Parse a column type as written in DDL, e.g. `VARCHAR(100)`, `TIMESTAMP(9) WITH TIME ZONE`
    /// or `INTERVAL YEAR(4) TO MONTH`. Precision and scale groups are ignored.
    #[must_use]
    pub fn parse(ddl: &str) -> Option<Self> {
        let normalized = normalize_ddl(ddl);
        let sql_type = match normalized.as_str() {
            "CHAR" | "CHARACTER" => SqlType::Char,
            "VARCHAR" | "VARCHAR2" | "CHARACTER VARYING" | "TEXT" => SqlType::Varchar,
            "NCHAR" | "NATIONAL CHARACTER" => SqlType::NChar,
            "NVARCHAR" | "NVARCHAR2" | "NATIONAL CHARACTER VARYING" => SqlType::NVarchar,
            "LONG" | "LONG VARCHAR" => SqlType::Long,
            "CLOB" | "CHARACTER LARGE OBJECT" => SqlType::Clob,
            "NCLOB" => SqlType::NClob,
            "RAW" | "VARBINARY" => SqlType::Raw,
            "LONG RAW" => SqlType::LongRaw,
            "BLOB" | "BINARY LARGE OBJECT" => SqlType::Blob,
            "NUMBER" | "NUMERIC" | "DECIMAL" | "DEC" | "INTEGER" | "INT" | "SMALLINT" => {
                SqlType::Number
            }
            "FLOAT" | "DOUBLE PRECISION" => SqlType::Float,
            "BINARY_FLOAT" => SqlType::BinaryFloat,
            "BINARY_DOUBLE" => SqlType::BinaryDouble,
            "DATE" => SqlType::Date,
            "TIMESTAMP" => SqlType::Timestamp,
            "TIMESTAMP WITH TIME ZONE" => SqlType::TimestampWithTimeZone,
            "TIMESTAMP WITH LOCAL TIME ZONE" => SqlType::TimestampWithLocalTimeZone,
            "INTERVAL YEAR TO MONTH" => SqlType::IntervalYearToMonth,
            "INTERVAL DAY TO SECOND" => SqlType::IntervalDayToSecond,
            "ROWID" => SqlType::RowId,
            "UROWID" => SqlType::URowId,
            "JSON" => SqlType::Json,
            _ => return None,
        };
        Some(sql_type)
    }

    /// Large objects are transferred through locators rather than inline.
    #[must_use]
    pub fn is_lob(self) -> bool {
        matches!(
            self,
            SqlType::Clob | SqlType::NClob | SqlType::Blob
        )
    }

    #[must_use]
    pub fn is_character(self) -> bool {
        matches!(
            self,
            SqlType::Char | SqlType::Varchar | SqlType::NChar | SqlType::NVarchar | SqlType::Long
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlType {
    type Err = SqlBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SqlType::parse(s)
            .ok_or_else(|| SqlBridgeError::unsupported(format!("unknown SQL type `{s}`")))
    }
}

/// Uppercase, drop `(...)` groups, collapse whitespace.
fn normalize_ddl(ddl: &str) -> String {
    let mut stripped = String::with_capacity(ddl.len());
    let mut depth = 0u32;
    for ch in ddl.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(ch.to_ascii_uppercase()),
            _ => {}
        }
    }
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
