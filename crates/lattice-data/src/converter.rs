//! Value converters used by bindings and group descriptions.

use std::sync::Arc;

use lattice_data_core::{ConversionError, Culture, Value};

/// Converts values between a source representation and a target representation.
pub trait ValueConverter: Send + Sync {
    /// Convert a source value for the target.
    fn convert(&self, value: &Value, parameter: &Value, culture: &Culture) -> Result<Value, ConversionError>;

    /// Convert a target value back for the source.
    fn convert_back(
        &self,
        value: &Value,
        _parameter: &Value,
        _culture: &Culture,
    ) -> Result<Value, ConversionError> {
        Err(ConversionError::new(value, "source", "conversion back is not supported"))
    }
}

type ConvertFn = Arc<dyn Fn(&Value, &Value, &Culture) -> Result<Value, ConversionError> + Send + Sync>;

/// A converter built from closures.
///
/// # Example
///
/// ```
/// use lattice_data::{FnConverter, ValueConverter};
/// use lattice_data_core::{Culture, Value};
///
/// let upper = FnConverter::new(|v, _, _| Ok(Value::from(v.to_display_string().to_uppercase())));
/// let out = upper.convert(&Value::from("ab"), &Value::Null, &Culture::invariant()).unwrap();
/// assert_eq!(out, Value::from("AB"));
/// ```
#[derive(Clone)]
pub struct FnConverter {
    convert: ConvertFn,
    convert_back: Option<ConvertFn>,
}

impl FnConverter {
    /// A one-way converter.
    pub fn new<F>(convert: F) -> Self
    where
        F: Fn(&Value, &Value, &Culture) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        Self {
            convert: Arc::new(convert),
            convert_back: None,
        }
    }

    /// Adds the reverse conversion.
    pub fn with_convert_back<F>(mut self, convert_back: F) -> Self
    where
        F: Fn(&Value, &Value, &Culture) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.convert_back = Some(Arc::new(convert_back));
        self
    }
}

impl ValueConverter for FnConverter {
    fn convert(&self, value: &Value, parameter: &Value, culture: &Culture) -> Result<Value, ConversionError> {
        (self.convert)(value, parameter, culture)
    }

    fn convert_back(
        &self,
        value: &Value,
        parameter: &Value,
        culture: &Culture,
    ) -> Result<Value, ConversionError> {
        match &self.convert_back {
            Some(back) => back(value, parameter, culture),
            None => Err(ConversionError::new(value, "source", "conversion back is not supported")),
        }
    }
}
