//! Live bindings over property paths.
//!
//! A [`PathBinding`] turns a [`PathWalker`] into a target value: it applies the
//! fallback value when the path is broken, the target-null value when the path
//! resolves to null, and an optional [`ValueConverter`] otherwise. Writes from
//! the target go back through the converter and the last step of the path.

use std::fmt;
use std::sync::{Arc, Weak};

use lattice_data_core::{Culture, Property, Signal, Value, logging::targets};
use parking_lot::Mutex;

use crate::converter::ValueConverter;
use crate::error::PathError;
use crate::path::{PathValue, PathWalker, PropertyPath};

/// A binding from a property path to a single target value.
///
/// Conversion failures never propagate as errors: they are logged, emitted on
/// [`binding_error`](Self::binding_error), and the update is dropped so the
/// target keeps its previous value.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lattice_data::PathBinding;
/// use lattice_data_core::{DynamicObject, Value};
///
/// let customer = Arc::new(DynamicObject::new("Customer").with("Name", "Ada"));
/// let binding = PathBinding::builder("Name")
///     .fallback_value("(none)")
///     .build()
///     .unwrap();
///
/// binding.set_root(Value::object(customer.clone()));
/// assert_eq!(binding.value(), Value::from("Ada"));
///
/// binding.set_root(Value::Null);
/// assert_eq!(binding.value(), Value::from("(none)"));
/// ```
pub struct PathBinding {
    walker: Arc<PathWalker>,
    fallback_value: Option<Value>,
    target_null_value: Option<Value>,
    converter: Option<Arc<dyn ValueConverter>>,
    converter_parameter: Value,
    culture: Property<Culture>,
    target: Mutex<Value>,
    /// Emitted with the new target value after every accepted update.
    pub value_changed: Signal<Value>,
    /// Emitted with a message when a conversion fails.
    pub binding_error: Signal<String>,
}

impl PathBinding {
    /// Start configuring a binding for `path`.
    pub fn builder(path: impl Into<String>) -> PathBindingBuilder {
        PathBindingBuilder::new(path)
    }

    /// The walker evaluating the path.
    pub fn walker(&self) -> &Arc<PathWalker> {
        &self.walker
    }

    /// The path text.
    pub fn path(&self) -> &PropertyPath {
        self.walker.path()
    }

    /// The current target value.
    pub fn value(&self) -> Value {
        self.target.lock().clone()
    }

    /// Returns `true` if the path is currently broken.
    pub fn is_broken(&self) -> bool {
        self.walker.is_broken()
    }

    /// The culture handed to the converter.
    pub fn culture(&self) -> Culture {
        self.culture.get()
    }

    /// Change the converter culture and re-evaluate the target.
    pub fn set_culture(&self, culture: Culture) {
        if self.culture.set(culture) {
            self.refresh_target();
        }
    }

    /// Bind against a new root object.
    pub fn set_root(&self, root: Value) {
        self.walker.update(root);
    }

    /// Push a target value back into the source.
    ///
    /// Returns `Ok(false)` if the converter rejected the value; the source is
    /// left untouched in that case.
    pub fn update_source(&self, target_value: Value) -> Result<bool, PathError> {
        let source_value = match &self.converter {
            Some(converter) => {
                match converter.convert_back(&target_value, &self.converter_parameter, &self.culture.get()) {
                    Ok(v) => v,
                    Err(err) => {
                        self.report(err.to_string());
                        return Ok(false);
                    }
                }
            }
            None => target_value,
        };
        self.walker.set_value(source_value)?;
        Ok(true)
    }

    /// Recompute the target value from the walker.
    fn refresh_target(&self) {
        let value = match self.walker.resolution() {
            PathValue::Broken => self.fallback_value.clone().unwrap_or_default(),
            PathValue::Resolved(Value::Null) => self.target_null_value.clone().unwrap_or_default(),
            PathValue::Resolved(v) => match &self.converter {
                Some(converter) => {
                    match converter.convert(&v, &self.converter_parameter, &self.culture.get()) {
                        Ok(converted) => converted,
                        Err(err) => {
                            self.report(err.to_string());
                            return;
                        }
                    }
                }
                None => v,
            },
        };
        *self.target.lock() = value.clone();
        self.value_changed.emit(value);
    }

    fn report(&self, message: String) {
        tracing::warn!(target: targets::BINDING, path = %self.walker.path(), %message, "conversion failed; update dropped");
        self.binding_error.emit(message);
    }
}

impl fmt::Debug for PathBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathBinding")
            .field("path", self.walker.path())
            .field("value", &self.value())
            .finish()
    }
}

/// Builder for [`PathBinding`].
pub struct PathBindingBuilder {
    path: String,
    fallback_value: Option<Value>,
    target_null_value: Option<Value>,
    converter: Option<Arc<dyn ValueConverter>>,
    converter_parameter: Value,
    culture: Culture,
}

impl PathBindingBuilder {
    /// Creates a builder for `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fallback_value: None,
            target_null_value: None,
            converter: None,
            converter_parameter: Value::Null,
            culture: Culture::invariant(),
        }
    }

    /// Value used while the path is broken.
    pub fn fallback_value(mut self, value: impl Into<Value>) -> Self {
        self.fallback_value = Some(value.into());
        self
    }

    /// Value used when the path resolves to null.
    pub fn target_null_value(mut self, value: impl Into<Value>) -> Self {
        self.target_null_value = Some(value.into());
        self
    }

    /// Converter applied between source and target.
    pub fn converter(mut self, converter: impl ValueConverter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// Parameter handed to the converter.
    pub fn converter_parameter(mut self, parameter: impl Into<Value>) -> Self {
        self.converter_parameter = parameter.into();
        self
    }

    /// Culture handed to the converter.
    pub fn culture(mut self, culture: Culture) -> Self {
        self.culture = culture;
        self
    }

    /// Parses the path and builds the binding (initially without a root).
    pub fn build(self) -> Result<Arc<PathBinding>, PathError> {
        let walker = PathWalker::new(&self.path)?;
        let binding = Arc::new(PathBinding {
            walker,
            fallback_value: self.fallback_value,
            target_null_value: self.target_null_value,
            converter: self.converter,
            converter_parameter: self.converter_parameter,
            culture: Property::new(self.culture),
            target: Mutex::new(Value::Null),
            value_changed: Signal::new(),
            binding_error: Signal::new(),
        });

        let weak: Weak<PathBinding> = Arc::downgrade(&binding);
        binding.walker.value_changed.connect(move |_| {
            if let Some(binding) = weak.upgrade() {
                binding.refresh_target();
            }
        });
        binding.refresh_target();
        Ok(binding)
    }
}

static_assertions::assert_impl_all!(PathBinding: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::FnConverter;
    use lattice_data_core::{ConversionError, DynamicObject};

    fn int_to_text() -> FnConverter {
        FnConverter::new(|v, _, _| match v {
            Value::Int(n) => Ok(Value::from(format!("#{n}"))),
            other => Err(ConversionError::new(other, "text", "expected an integer")),
        })
        .with_convert_back(|v, _, _| {
            v.as_str()
                .and_then(|s| s.strip_prefix('#'))
                .and_then(|s| s.parse::<i64>().ok())
                .map(Value::Int)
                .ok_or_else(|| ConversionError::new(v, "Int", "expected #<number>"))
        })
    }

    #[test]
    fn test_fallback_and_target_null() {
        let order = Arc::new(DynamicObject::new("Order").with("Note", Value::Null));
        let binding = PathBinding::builder("Note")
            .fallback_value("broken")
            .target_null_value("empty")
            .build()
            .unwrap();
        assert_eq!(binding.value(), Value::from("broken"));

        binding.set_root(Value::object(order.clone()));
        assert_eq!(binding.value(), Value::from("empty"));

        order.set("Note", "ship fast");
        assert_eq!(binding.value(), Value::from("ship fast"));
    }

    #[test]
    fn test_conversion_failure_keeps_previous_value() {
        let item = Arc::new(DynamicObject::new("Item").with("Qty", 3));
        let binding = PathBinding::builder("Qty").converter(int_to_text()).build().unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        binding
            .binding_error
            .connect(move |msg| errors_clone.lock().push(msg.clone()));

        binding.set_root(Value::object(item.clone()));
        assert_eq!(binding.value(), Value::from("#3"));

        item.set("Qty", "lots");
        assert_eq!(binding.value(), Value::from("#3"));
        assert_eq!(errors.lock().len(), 1);
    }

    #[test]
    fn test_two_way_update_source() {
        let item = Arc::new(DynamicObject::new("Item").with("Qty", 3));
        let binding = PathBinding::builder("Qty").converter(int_to_text()).build().unwrap();
        binding.set_root(Value::object(item.clone()));

        assert!(binding.update_source(Value::from("#8")).unwrap());
        assert_eq!(item.get("Qty"), Some(Value::Int(8)));
        assert_eq!(binding.value(), Value::from("#8"));

        assert!(!binding.update_source(Value::from("eight")).unwrap());
        assert_eq!(item.get("Qty"), Some(Value::Int(8)));
    }

    #[test]
    fn test_update_source_through_broken_path() {
        let binding = PathBinding::builder("Qty").build().unwrap();
        assert!(matches!(
            binding.update_source(Value::Int(1)),
            Err(PathError::Broken(_))
        ));
    }

    #[test]
    fn test_value_changed_emitted() {
        let item = Arc::new(DynamicObject::new("Item").with("Qty", 1));
        let binding = PathBinding::builder("Qty").build().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        binding
            .value_changed
            .connect(move |v| seen_clone.lock().push(v.clone()));

        binding.set_root(Value::object(item.clone()));
        item.set("Qty", 2);
        assert_eq!(*seen.lock(), vec![Value::Int(1), Value::Int(2)]);
    }
}
