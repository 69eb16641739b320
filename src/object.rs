//! Live object model handed to the graph builder and produced by shadows.
//!
//! Objects live in an [`ObjectHeap`] arena and point at each other through
//! [`ObjRef`] handles, so back-references and cycles need no shared
//! ownership.

use hashbrown::HashMap;

use crate::types::Scalar;

/// Handle of an instance inside an [`ObjectHeap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(usize);

impl ObjRef {
    /// Arena slot of this handle.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Raw property value of a live instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Scalar leaf.
    Scalar(Scalar),
    /// Reference to another instance in the same heap.
    Ref(ObjRef),
    /// Ordered elements; lists, sets and arrays all use this shape and
    /// the declared property type decides how they are compared.
    Seq(Vec<Value>),
    /// Key-value entries.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Text scalar.
    pub fn text(v: impl Into<String>) -> Self {
        Self::Scalar(Scalar::Text(v.into()))
    }

    /// Integer scalar.
    pub fn int(v: i64) -> Self {
        Self::Scalar(Scalar::Int(v))
    }

    /// Float scalar.
    pub fn float(v: f64) -> Self {
        Self::Scalar(Scalar::Float(v))
    }

    /// Boolean scalar.
    pub fn bool(v: bool) -> Self {
        Self::Scalar(Scalar::Bool(v))
    }

    /// Sequence of integers.
    pub fn ints(values: impl IntoIterator<Item = i64>) -> Self {
        Self::Seq(values.into_iter().map(Self::int).collect())
    }

    /// Sequence of references.
    pub fn refs(values: impl IntoIterator<Item = ObjRef>) -> Self {
        Self::Seq(values.into_iter().map(Self::Ref).collect())
    }

    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::text(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::text(v)
    }
}

impl From<ObjRef> for Value {
    fn from(v: ObjRef) -> Self {
        Self::Ref(v)
    }
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Self::Scalar(v)
    }
}

/// One live object: its class and raw property values.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    class: String,
    properties: HashMap<String, Value>,
}

impl Instance {
    /// Creates an instance of `class` with no properties set.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            properties: HashMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a property, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(name.into(), value.into())
    }

    /// Class identifier used to look up the type declaration.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Raw property value, if set.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Iterates over all set properties in unspecified order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Arena of live instances.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectHeap {
    objects: Vec<Instance>,
}

impl ObjectHeap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an instance and returns its handle.
    pub fn alloc(&mut self, instance: Instance) -> ObjRef {
        self.objects.push(instance);
        ObjRef(self.objects.len() - 1)
    }

    /// Instance behind `obj`.
    pub fn get(&self, obj: ObjRef) -> Option<&Instance> {
        self.objects.get(obj.0)
    }

    /// Mutable instance behind `obj`.
    pub fn get_mut(&mut self, obj: ObjRef) -> Option<&mut Instance> {
        self.objects.get_mut(obj.0)
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when the heap holds no instances.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates over handles and instances in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &Instance)> {
        self.objects.iter().enumerate().map(|(i, o)| (ObjRef(i), o))
    }
}
