use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::errors::RsgisError;

/// Pixel data type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UInt8,
    UInt16,
    UInt32,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// GDAL style name, e.g. `Byte` or `Float32`.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::UInt8 => "Byte",
            DataType::UInt16 => "UInt16",
            DataType::UInt32 => "UInt32",
            DataType::Int16 => "Int16",
            DataType::Int32 => "Int32",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            DataType::UInt8 => 8,
            DataType::UInt16 | DataType::Int16 => 16,
            DataType::UInt32 | DataType::Int32 | DataType::Float32 => 32,
            DataType::Float64 => 64,
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// The `(min, max)` range representable by the type.
    pub fn range(&self) -> (f64, f64) {
        match self {
            DataType::UInt8 => (u8::MIN as f64, u8::MAX as f64),
            DataType::UInt16 => (u16::MIN as f64, u16::MAX as f64),
            DataType::UInt32 => (u32::MIN as f64, u32::MAX as f64),
            DataType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            DataType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            DataType::Float32 => (f32::MIN as f64, f32::MAX as f64),
            DataType::Float64 => (f64::MIN, f64::MAX),
        }
    }

    /// Convert `value` to what a band of this type would store.
    ///
    /// Integer types round to nearest and saturate at their range, NaN
    /// becomes zero. `Float32` goes through an `f32` round trip.
    pub fn store(&self, value: f64) -> f64 {
        match self {
            DataType::Float64 => value,
            DataType::Float32 => value as f32 as f64,
            _ => {
                if value.is_nan() {
                    return 0.0;
                }
                let (min, max) = self.range();
                value.round().clamp(min, max)
            }
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = RsgisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data_type = match s.to_ascii_lowercase().as_str() {
            "byte" | "uint8" | "u8" => DataType::UInt8,
            "uint16" | "u16" => DataType::UInt16,
            "uint32" | "u32" => DataType::UInt32,
            "int16" | "i16" => DataType::Int16,
            "int32" | "i32" => DataType::Int32,
            "float32" | "f32" => DataType::Float32,
            "float64" | "f64" => DataType::Float64,
            _ => {
                return Err(RsgisError::InvalidParameter {
                    name: "data_type",
                    value: s.to_string(),
                    reason: "unknown pixel data type".to_string(),
                })
            }
        };
        Ok(data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("Byte".parse::<DataType>().unwrap(), DataType::UInt8);
        assert_eq!("float32".parse::<DataType>().unwrap(), DataType::Float32);
        assert_eq!("UInt32".parse::<DataType>().unwrap(), DataType::UInt32);
        assert!("Complex64".parse::<DataType>().is_err());
    }

    #[test]
    fn name_round_trips() {
        for dt in [
            DataType::UInt8,
            DataType::UInt16,
            DataType::UInt32,
            DataType::Int16,
            DataType::Int32,
            DataType::Float32,
            DataType::Float64,
        ] {
            assert_eq!(dt.name().parse::<DataType>().unwrap(), dt);
        }
    }

    #[test]
    fn store_saturates_integers() {
        assert_eq!(DataType::UInt8.store(300.0), 255.0);
        assert_eq!(DataType::UInt8.store(-4.0), 0.0);
        assert_eq!(DataType::Int16.store(-1.6), -2.0);
        assert_eq!(DataType::UInt32.store(f64::NAN), 0.0);
        assert_eq!(DataType::Float64.store(0.1), 0.1);
        assert_eq!(DataType::Float32.store(0.1), 0.1f32 as f64);
    }
}
