use crate::color::{ColorSpace, Rgb};
use crate::geometry::matrix::Matrix4f;
use crate::{Float, Point3f, Vec3f};
use bitflags::bitflags;
use std::collections::HashMap;
use tracing::warn;

bitflags! {
    /// Outcome of an entity-creation call. `OK` is the empty set;
    /// warnings compose with success, error bits mean nothing was
    /// created.
    pub struct ResultFlags: u32 {
        const OK = 0;
        const WARNING = 1 << 0;
        const ERROR_WHILE_CREATING = 1 << 1;
        const ERROR_DUPLICATE_NAME = 1 << 2;
        const ERROR_TYPE_UNKNOWN = 1 << 3;
        const ERROR_PARAMS_MISSING = 1 << 4;
    }
}

impl ResultFlags {
    pub fn is_ok(&self) -> bool {
        !self.intersects(
            ResultFlags::ERROR_WHILE_CREATING
                | ResultFlags::ERROR_DUPLICATE_NAME
                | ResultFlags::ERROR_TYPE_UNKNOWN
                | ResultFlags::ERROR_PARAMS_MISSING,
        )
    }
}

/// One typed parameter value.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Vector(Vec3f),
    Color(Rgb, Float),
    Matrix(Matrix4f),
}

/// String-keyed typed parameter set, the lingua franca of entity
/// factories. Colors convert to linear RGB on read, honoring the map's
/// `input_color_space` and `input_gamma` entries.
#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    map: HashMap<String, ParamValue>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_int(&mut self, name: &str, v: i64) -> &mut Self {
        self.map.insert(name.to_string(), ParamValue::Int(v));
        self
    }

    pub fn set_float(&mut self, name: &str, v: f64) -> &mut Self {
        self.map.insert(name.to_string(), ParamValue::Float(v));
        self
    }

    pub fn set_bool(&mut self, name: &str, v: bool) -> &mut Self {
        self.map.insert(name.to_string(), ParamValue::Bool(v));
        self
    }

    pub fn set_string(&mut self, name: &str, v: &str) -> &mut Self {
        self.map.insert(name.to_string(), ParamValue::Str(v.to_string()));
        self
    }

    pub fn set_vector(&mut self, name: &str, v: Vec3f) -> &mut Self {
        self.map.insert(name.to_string(), ParamValue::Vector(v));
        self
    }

    pub fn set_color(&mut self, name: &str, c: Rgb) -> &mut Self {
        self.map.insert(name.to_string(), ParamValue::Color(c, 1.0));
        self
    }

    pub fn set_color_alpha(&mut self, name: &str, c: Rgb, a: Float) -> &mut Self {
        self.map.insert(name.to_string(), ParamValue::Color(c, a));
        self
    }

    pub fn set_matrix(&mut self, name: &str, m: [[Float; 4]; 4], transpose: bool) -> &mut Self {
        self.map
            .insert(name.to_string(), ParamValue::Matrix(Matrix4f::from_rows(m, transpose)));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    fn input_conversion(&self) -> (ColorSpace, Float) {
        let space = match self.map.get("input_color_space") {
            Some(ParamValue::Str(s)) => ColorSpace::from_name(s).unwrap_or_else(|| {
                warn!(value = s.as_str(), "unknown input_color_space, using linear");
                ColorSpace::LinearRgb
            }),
            _ => ColorSpace::LinearRgb,
        };
        let gamma = match self.map.get("input_gamma") {
            Some(ParamValue::Float(g)) => *g as Float,
            Some(ParamValue::Int(g)) => *g as Float,
            _ => 1.0,
        };
        (space, gamma)
    }

    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        match self.map.get(name) {
            Some(ParamValue::Int(v)) => *v,
            Some(other) => {
                warn!(param = name, ?other, "parameter has wrong type, using default");
                default
            }
            None => default,
        }
    }

    pub fn get_float(&self, name: &str, default: Float) -> Float {
        match self.map.get(name) {
            Some(ParamValue::Float(v)) => *v as Float,
            Some(ParamValue::Int(v)) => *v as Float,
            Some(other) => {
                warn!(param = name, ?other, "parameter has wrong type, using default");
                default
            }
            None => default,
        }
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.map.get(name) {
            Some(ParamValue::Bool(v)) => *v,
            Some(other) => {
                warn!(param = name, ?other, "parameter has wrong type, using default");
                default
            }
            None => default,
        }
    }

    pub fn get_string(&self, name: &str, default: &str) -> String {
        match self.map.get(name) {
            Some(ParamValue::Str(v)) => v.clone(),
            Some(other) => {
                warn!(param = name, ?other, "parameter has wrong type, using default");
                default.to_string()
            }
            None => default.to_string(),
        }
    }

    pub fn get_vector(&self, name: &str, default: Vec3f) -> Vec3f {
        match self.map.get(name) {
            Some(ParamValue::Vector(v)) => *v,
            Some(other) => {
                warn!(param = name, ?other, "parameter has wrong type, using default");
                default
            }
            None => default,
        }
    }

    pub fn get_point(&self, name: &str, default: Point3f) -> Point3f {
        let v = self.get_vector(name, default - Point3f::new(0.0, 0.0, 0.0));
        Point3f::new(v.x, v.y, v.z)
    }

    /// Color read with the map's input conversion applied.
    pub fn get_color(&self, name: &str, default: Rgb) -> Rgb {
        match self.map.get(name) {
            Some(ParamValue::Color(c, _a)) => {
                let (space, gamma) = self.input_conversion();
                c.ingest(space, gamma)
            }
            Some(other) => {
                warn!(param = name, ?other, "parameter has wrong type, using default");
                default
            }
            None => default,
        }
    }

    pub fn get_matrix(&self, name: &str) -> Option<Matrix4f> {
        match self.map.get(name) {
            Some(ParamValue::Matrix(m)) => Some(*m),
            _ => None,
        }
    }

    /// Required string; its absence is a creation error.
    pub fn require_string(&self, name: &str) -> Result<String, ResultFlags> {
        match self.map.get(name) {
            Some(ParamValue::Str(v)) => Ok(v.clone()),
            _ => Err(ResultFlags::ERROR_PARAMS_MISSING),
        }
    }

    pub fn require_vector(&self, name: &str) -> Result<Vec3f, ResultFlags> {
        match self.map.get(name) {
            Some(ParamValue::Vector(v)) => Ok(*v),
            _ => Err(ResultFlags::ERROR_PARAMS_MISSING),
        }
    }
}

/// Parses an enum-style string parameter against the accepted options,
/// falling back to `default` with a warning on unknown values.
pub fn parse_enum<'a>(value: &str, options: &[&'a str], default: &'a str) -> &'a str {
    for &opt in options {
        if opt.eq_ignore_ascii_case(value) {
            return opt;
        }
    }
    warn!(value, ?options, "unknown enum value, using default");
    default
}
