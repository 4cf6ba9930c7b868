use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result, Value};

pub(crate) const DEFAULT_DECIMAL: (u32, u32) = (10, 0);
pub(crate) const MAX_DECIMAL_PRECISION: u32 = 65;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Decimal,
    Numeric,
    Date,
    Timestamp,
    DateTime,
    Text,
    Varchar,
    Blob,
    VarBinary,
}

impl ColumnType {
    pub const ALL: [Self; 14] = [
        Self::Boolean,
        Self::SmallInt,
        Self::Integer,
        Self::BigInt,
        Self::Float,
        Self::Decimal,
        Self::Numeric,
        Self::Date,
        Self::Timestamp,
        Self::DateTime,
        Self::Text,
        Self::Varchar,
        Self::Blob,
        Self::VarBinary,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::SmallInt => "smallint",
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::DateTime => "datetime",
            Self::Text => "text",
            Self::Varchar => "varchar",
            Self::Blob => "blob",
            Self::VarBinary => "varbinary",
        }
    }

    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Boolean | Self::SmallInt | Self::Integer | Self::BigInt
        )
    }

    #[must_use]
    pub const fn is_fractional(self) -> bool {
        matches!(self, Self::Float | Self::Decimal | Self::Numeric)
    }

    #[must_use]
    pub const fn is_decimal(self) -> bool {
        matches!(self, Self::Decimal | Self::Numeric)
    }

    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Timestamp | Self::DateTime)
    }

    #[must_use]
    pub const fn is_identity_capable(self) -> bool {
        matches!(self, Self::SmallInt | Self::Integer | Self::BigInt)
    }

    #[must_use]
    pub const fn is_large_object(self) -> bool {
        matches!(self, Self::Text | Self::Blob)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = ConfigError;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|column_type| column_type.as_str() == lowered)
            .ok_or_else(|| ConfigError::UnknownColumnType(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnDefault {
    /// Explicit `DEFAULT NULL`.
    Null,
    Literal(Value),
    /// `CURRENT_TIMESTAMP` on insert.
    Now,
    /// `CURRENT_TIMESTAMP` on insert and on every update.
    NowOnUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub length: Option<u64>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
    pub unsigned: bool,
    pub identity: bool,
    pub primary: bool,
    pub primary_position: Option<u32>,
    pub comment: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
            precision: None,
            scale: None,
            nullable: true,
            default: None,
            unsigned: false,
            identity: false,
            primary: false,
            primary_position: None,
            comment: None,
        }
    }

    #[must_use]
    pub fn length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    #[must_use]
    pub fn decimal(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub fn not_null(self) -> Self {
        self.nullable(false)
    }

    #[must_use]
    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        if !self.identity {
            self.default = Some(default);
        }
        self
    }

    #[must_use]
    pub fn unsigned(mut self, unsigned: bool) -> Self {
        self.unsigned = unsigned;
        self
    }

    /// Identity columns are non-nullable and never carry a default.
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self.nullable = false;
        self.default = None;
        self
    }

    #[must_use]
    pub fn primary(mut self, position: u32) -> Self {
        self.primary = true;
        self.primary_position = Some(position);
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Applies a loosely-typed option as found in legacy option maps.
    pub fn option(self, key: &str, value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        let invalid = |value: &Value| ConfigError::InvalidColumnOption {
            option: key.to_string(),
            value: value.to_text().unwrap_or_else(|| "NULL".to_string()),
        };
        let flag = |value: &Value| value.as_bool().ok_or_else(|| invalid(value));
        let number = |value: &Value| {
            value
                .as_i64()
                .and_then(|number| u64::try_from(number).ok())
                .ok_or_else(|| invalid(value))
        };

        let column = match key.to_ascii_lowercase().as_str() {
            "length" => self.length(number(&value)?),
            "precision" => {
                let precision = u32::try_from(number(&value)?).map_err(|_| invalid(&value))?;
                Self {
                    precision: Some(precision),
                    ..self
                }
            }
            "scale" => {
                let scale = u32::try_from(number(&value)?).map_err(|_| invalid(&value))?;
                Self {
                    scale: Some(scale),
                    ..self
                }
            }
            "nullable" => self.nullable(flag(&value)?),
            "unsigned" => self.unsigned(flag(&value)?),
            "identity" | "auto_increment" => {
                if flag(&value)? {
                    self.identity()
                } else {
                    self
                }
            }
            "primary" => {
                if flag(&value)? {
                    self.primary(1)
                } else {
                    self
                }
            }
            "primary_position" => {
                let position = u32::try_from(number(&value)?).map_err(|_| invalid(&value))?;
                self.primary(position)
            }
            "comment" => self.comment(value.to_text().unwrap_or_default()),
            "default" => {
                let default = match &value {
                    Value::Null => ColumnDefault::Null,
                    Value::Text(text) if text.eq_ignore_ascii_case("current_timestamp") => {
                        ColumnDefault::Now
                    }
                    Value::Text(text)
                        if text.eq_ignore_ascii_case("current_timestamp on update") =>
                    {
                        ColumnDefault::NowOnUpdate
                    }
                    other => ColumnDefault::Literal(other.clone()),
                };
                self.default_value(default)
            }
            _ => return Err(ConfigError::UnknownColumnOption(key.to_string()).into()),
        };
        Ok(column)
    }

    /// Precision and scale with the decimal default filled in.
    #[must_use]
    pub fn decimal_spec(&self) -> (u32, u32) {
        match (self.precision, self.scale) {
            (Some(precision), Some(scale)) => (precision, scale),
            (Some(precision), None) => (precision, 0),
            (None, Some(scale)) => (DEFAULT_DECIMAL.0.max(scale), scale),
            (None, None) => DEFAULT_DECIMAL,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.column_type.is_decimal() {
            let (precision, scale) = self.decimal_spec();
            if precision == 0 || precision > MAX_DECIMAL_PRECISION || scale > precision {
                return Err(ConfigError::InvalidDecimal {
                    column: self.name.clone(),
                    precision,
                    scale,
                }
                .into());
            }
        }
        if self.identity && !self.column_type.is_identity_capable() {
            return Err(ConfigError::InvalidIdentityType {
                column: self.name.clone(),
                column_type: self.column_type.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Default that actually reaches DDL; identity columns never carry one.
    #[must_use]
    pub fn effective_default(&self) -> Option<&ColumnDefault> {
        if self.identity {
            None
        } else {
            self.default.as_ref()
        }
    }

    #[must_use]
    pub fn effective_nullable(&self) -> bool {
        self.nullable && !self.identity && !self.primary
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnDefault, ColumnDefinition, ColumnType};
    use crate::{ConfigError, Error, Value};

    #[test]
    fn identity_drops_default_and_nullability() {
        let column = ColumnDefinition::new("id", ColumnType::Integer)
            .default_value(ColumnDefault::Literal(Value::Int(3)))
            .identity();
        assert!(column.identity);
        assert!(!column.nullable);
        assert_eq!(column.default, None);
    }

    #[test]
    fn decimal_spec_defaults_to_ten_zero() {
        let column = ColumnDefinition::new("price", ColumnType::Decimal);
        assert_eq!(column.decimal_spec(), (10, 0));
        assert_eq!(column.clone().decimal(12, 4).decimal_spec(), (12, 4));
    }

    #[test]
    fn oversized_decimal_is_rejected() {
        let column = ColumnDefinition::new("price", ColumnType::Numeric).decimal(70, 2);
        assert!(matches!(
            column.validate(),
            Err(Error::Config(ConfigError::InvalidDecimal { precision: 70, .. }))
        ));
        let column = ColumnDefinition::new("price", ColumnType::Numeric).decimal(4, 6);
        assert!(column.validate().is_err());
    }

    #[test]
    fn option_map_rejects_unknown_keys() {
        let column = ColumnDefinition::new("name", ColumnType::Varchar)
            .option("length", 32)
            .and_then(|column| column.option("nullable", false))
            .expect("known options");
        assert_eq!(column.length, Some(32));
        assert!(!column.nullable);

        let error = ColumnDefinition::new("name", ColumnType::Varchar)
            .option("colour", "red")
            .expect_err("unknown option");
        assert!(matches!(
            error,
            Error::Config(ConfigError::UnknownColumnOption(key)) if key == "colour"
        ));
    }

    #[test]
    fn type_names_parse_case_insensitively() {
        assert_eq!("VARCHAR".parse::<ColumnType>(), Ok(ColumnType::Varchar));
        assert_eq!(
            "jsonb".parse::<ColumnType>(),
            Err(ConfigError::UnknownColumnType("jsonb".to_string()))
        );
    }
}
