//! Array values
//!
//! [`ArrayValue`] represents an array or tuple of the language at execution
//! time. Exactly one specialized storage backend is selected at construction
//! from the element type and never changes for the lifetime of the instance;
//! scalar and string arrays keep their elements inline, everything else is
//! stored as boxed [`Value`]s.
//!
//! All accessors take `&self`; interior state sits behind a `RwLock`. The
//! only cross-thread coordination an array needs beyond that is its freeze
//! status: every mutator holds the status guard for the duration of the
//! write, so a freeze completing on another thread can never land in the
//! middle of an update.

use crate::error::{ValueError, ValueResult};
use crate::freeze::FreezeStatus;
use crate::value::{format_float, Value};
use marten_vm_types::{ArrayState, TypeDesc, TypeTag};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Physical capacity pre-allocated when no explicit size is given.
///
/// Avoids repeated reallocation on the first writes to a fresh array.
pub const DEFAULT_ARRAY_SIZE: usize = 100;

/// The maximum logical length an open array may ever reach.
///
/// The index domain is fixed at 32 bits regardless of platform so that
/// bounds behavior is identical everywhere; the small slack below `i32::MAX`
/// leaves room for internal bookkeeping without overflow.
pub const MAX_ARRAY_SIZE: usize = (i32::MAX - 8) as usize;

/// Shared handle to an array value.
///
/// Arrays are aliased freely by the interpreter (an array can even contain
/// itself), so they are handed around by reference count.
pub type ArrayRef = Arc<ArrayValue>;

/// The kind of storage backend - determines element representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// 64-bit signed integers
    Int,
    /// Boolean flags (stored as narrow integers)
    Boolean,
    /// 8-bit unsigned integers
    Byte,
    /// 64-bit floating point
    Float,
    /// UTF-8 strings
    String,
    /// Boxed references (nested arrays, tuples, open typing)
    Ref,
}

impl StorageKind {
    /// Get the name of this storage kind
    pub fn name(&self) -> &'static str {
        match self {
            StorageKind::Int => "int storage",
            StorageKind::Boolean => "boolean storage",
            StorageKind::Byte => "byte storage",
            StorageKind::Float => "float storage",
            StorageKind::String => "string storage",
            StorageKind::Ref => "reference storage",
        }
    }

    /// Backend selected for an element type tag.
    ///
    /// The four scalar kinds and strings get their own contiguous buffers;
    /// everything else (arrays, tuples, `any`) is boxed.
    fn for_tag(tag: TypeTag) -> StorageKind {
        match tag {
            TypeTag::Int => StorageKind::Int,
            TypeTag::Boolean => StorageKind::Boolean,
            TypeTag::Byte => StorageKind::Byte,
            TypeTag::Float => StorageKind::Float,
            TypeTag::String => StorageKind::String,
            TypeTag::Array | TypeTag::Tuple | TypeTag::Any => StorageKind::Ref,
        }
    }
}

/// The active storage backend of an array.
///
/// The `Vec` length is the physical capacity; unwritten slots hold the
/// backend default (zero, empty string, absent reference). The logical
/// length is tracked separately in [`Inner::size`].
#[derive(Debug, Clone)]
enum Storage {
    Int(Vec<i64>),
    Boolean(Vec<i32>),
    Byte(Vec<u8>),
    Float(Vec<f64>),
    String(Vec<String>),
    Ref(Vec<Option<Value>>),
}

impl Storage {
    /// Allocate a backend of `kind` with `len` default-filled slots.
    fn with_capacity(kind: StorageKind, len: usize) -> Storage {
        match kind {
            StorageKind::Int => Storage::Int(vec![0; len]),
            StorageKind::Boolean => Storage::Boolean(vec![0; len]),
            StorageKind::Byte => Storage::Byte(vec![0; len]),
            StorageKind::Float => Storage::Float(vec![0.0; len]),
            StorageKind::String => Storage::String(vec![String::new(); len]),
            StorageKind::Ref => Storage::Ref(vec![None; len]),
        }
    }

    fn kind(&self) -> StorageKind {
        match self {
            Storage::Int(_) => StorageKind::Int,
            Storage::Boolean(_) => StorageKind::Boolean,
            Storage::Byte(_) => StorageKind::Byte,
            Storage::Float(_) => StorageKind::Float,
            Storage::String(_) => StorageKind::String,
            Storage::Ref(_) => StorageKind::Ref,
        }
    }

    fn physical_size(&self) -> usize {
        match self {
            Storage::Int(v) => v.len(),
            Storage::Boolean(v) => v.len(),
            Storage::Byte(v) => v.len(),
            Storage::Float(v) => v.len(),
            Storage::String(v) => v.len(),
            Storage::Ref(v) => v.len(),
        }
    }

    /// Reallocate to exactly `new_length` slots, preserving existing
    /// contents and default-filling any new slots.
    fn grow(&mut self, new_length: usize) {
        match self {
            Storage::Int(v) => v.resize(new_length, 0),
            Storage::Boolean(v) => v.resize(new_length, 0),
            Storage::Byte(v) => v.resize(new_length, 0),
            Storage::Float(v) => v.resize(new_length, 0.0),
            Storage::String(v) => v.resize(new_length, String::new()),
            Storage::Ref(v) => v.resize(new_length, None),
        }
    }

    /// Duplicate the first `len` slots into a fresh backend of the same
    /// kind. Reference slots are shallow-copied; callers doing a deep copy
    /// rebuild them afterwards.
    fn clone_prefix(&self, len: usize) -> Storage {
        fn prefix<T: Clone + Default>(v: &[T], len: usize) -> Vec<T> {
            let mut out = v[..len.min(v.len())].to_vec();
            out.resize_with(len, T::default);
            out
        }
        match self {
            Storage::Int(v) => Storage::Int(prefix(v, len)),
            Storage::Boolean(v) => Storage::Boolean(prefix(v, len)),
            Storage::Byte(v) => Storage::Byte(prefix(v, len)),
            Storage::Float(v) => Storage::Float(prefix(v, len)),
            Storage::String(v) => Storage::String(prefix(v, len)),
            Storage::Ref(v) => Storage::Ref(prefix(v, len)),
        }
    }
}

/// Lock-protected mutable state of an array.
#[derive(Debug)]
struct Inner {
    storage: Storage,
    /// Logical element count; `size <= capacity_limit` always.
    size: usize,
}

/// An array or tuple value.
///
/// Construction picks exactly one storage backend from the element type;
/// the typed `get_*`/`add_*` surface then dispatches directly to it, so a
/// scalar array never pays boxing costs. Indexed writes beyond the current
/// logical end extend it (slots in between keep the backend default).
#[derive(Debug)]
pub struct ArrayValue {
    declared_type: TypeDesc,
    element_type: Option<TypeDesc>,
    capacity_limit: usize,
    freeze: FreezeStatus,
    inner: RwLock<Inner>,
}

impl ArrayValue {
    // ---- constructors ----------------------------------------------------

    /// Create an open int array from an explicit buffer
    pub fn from_ints(values: Vec<i64>) -> Self {
        let size = values.len();
        Self::from_parts(TypeDesc::Int, Storage::Int(values), size)
    }

    /// Create an open boolean array from an explicit buffer
    pub fn from_booleans(values: Vec<bool>) -> Self {
        let size = values.len();
        let flags = values.into_iter().map(i32::from).collect();
        Self::from_parts(TypeDesc::Boolean, Storage::Boolean(flags), size)
    }

    /// Create an open byte array from an explicit buffer
    pub fn from_bytes(values: Vec<u8>) -> Self {
        let size = values.len();
        Self::from_parts(TypeDesc::Byte, Storage::Byte(values), size)
    }

    /// Create an open float array from an explicit buffer
    pub fn from_floats(values: Vec<f64>) -> Self {
        let size = values.len();
        Self::from_parts(TypeDesc::Float, Storage::Float(values), size)
    }

    /// Create an open string array from an explicit buffer
    pub fn from_strings(values: Vec<String>) -> Self {
        let size = values.len();
        Self::from_parts(TypeDesc::String, Storage::String(values), size)
    }

    /// Create an array over an explicit boxed-reference buffer.
    ///
    /// `declared_type` is the full array/tuple type of the new value; a
    /// fixed-size descriptor pins the capacity limit to its bound.
    pub fn from_refs(values: Vec<Option<Value>>, declared_type: TypeDesc) -> Self {
        let size = values.len();
        let capacity_limit = declared_type.fixed_size().unwrap_or(MAX_ARRAY_SIZE);
        Self {
            element_type: declared_type.element_type().cloned(),
            declared_type,
            capacity_limit,
            freeze: FreezeStatus::new(),
            inner: RwLock::new(Inner {
                storage: Storage::Ref(values),
                size,
            }),
        }
    }

    /// Create an array from a type descriptor with default sizing.
    ///
    /// A scalar or string element type selects the matching specialized
    /// backend. Array and tuple descriptors use boxed storage; closed
    /// arrays and tuples are pre-sized to their fixed bound with every slot
    /// holding the zero-value of its member type.
    pub fn new_with_type(ty: &TypeDesc) -> Self {
        match ty {
            TypeDesc::Int
            | TypeDesc::Boolean
            | TypeDesc::Byte
            | TypeDesc::Float
            | TypeDesc::String => {
                let storage = Storage::with_capacity(
                    StorageKind::for_tag(ty.tag()),
                    DEFAULT_ARRAY_SIZE,
                );
                Self::from_parts(ty.clone(), storage, 0)
            }
            TypeDesc::Array(at) => {
                let element = at.element_type().clone();
                match at.state() {
                    ArrayState::ClosedSealed(bound) => {
                        let zero = Value::zero_of(&element);
                        Self {
                            declared_type: ty.clone(),
                            element_type: Some(element),
                            capacity_limit: bound,
                            freeze: FreezeStatus::new(),
                            inner: RwLock::new(Inner {
                                storage: Storage::Ref(vec![zero; bound]),
                                size: bound,
                            }),
                        }
                    }
                    ArrayState::Open => {
                        let zero = Value::zero_of(&element);
                        Self {
                            declared_type: ty.clone(),
                            element_type: Some(element),
                            capacity_limit: MAX_ARRAY_SIZE,
                            freeze: FreezeStatus::new(),
                            inner: RwLock::new(Inner {
                                storage: Storage::Ref(vec![zero; DEFAULT_ARRAY_SIZE]),
                                size: 0,
                            }),
                        }
                    }
                }
            }
            TypeDesc::Tuple(tt) => {
                let slots: Vec<Option<Value>> =
                    tt.member_types().iter().map(Value::zero_of).collect();
                let arity = slots.len();
                Self {
                    declared_type: ty.clone(),
                    element_type: None,
                    capacity_limit: arity,
                    freeze: FreezeStatus::new(),
                    inner: RwLock::new(Inner {
                        storage: Storage::Ref(slots),
                        size: arity,
                    }),
                }
            }
            TypeDesc::Any => Self {
                declared_type: ty.clone(),
                element_type: None,
                capacity_limit: MAX_ARRAY_SIZE,
                freeze: FreezeStatus::new(),
                inner: RwLock::new(Inner {
                    storage: Storage::Ref(vec![None; DEFAULT_ARRAY_SIZE]),
                    size: 0,
                }),
            },
        }
    }

    /// Create an array of `element` with explicit sizing.
    ///
    /// A given size seals the array: logical length and capacity limit are
    /// pinned to it and every slot starts at the element's zero-value. With
    /// `None` the array is open and gets the default physical capacity.
    pub fn with_size(element: &TypeDesc, size: Option<usize>) -> Self {
        let (size, capacity_limit, declared_type) = match size {
            Some(n) => (n, n, TypeDesc::sealed_array(element.clone(), n)),
            None => (0, MAX_ARRAY_SIZE, TypeDesc::array(element.clone())),
        };
        let physical = if size > 0 { size } else { DEFAULT_ARRAY_SIZE };
        let kind = StorageKind::for_tag(element.tag());
        let storage = match kind {
            StorageKind::Ref => Storage::Ref(vec![Value::zero_of(element); physical]),
            scalar => Storage::with_capacity(scalar, physical),
        };
        Self {
            declared_type,
            element_type: Some(element.clone()),
            capacity_limit,
            freeze: FreezeStatus::new(),
            inner: RwLock::new(Inner { storage, size }),
        }
    }

    /// Create an empty untyped array over boxed storage
    pub fn new() -> Self {
        Self::new_with_type(&TypeDesc::Any)
    }

    fn from_parts(element: TypeDesc, storage: Storage, size: usize) -> Self {
        Self {
            declared_type: TypeDesc::array(element.clone()),
            element_type: Some(element),
            capacity_limit: MAX_ARRAY_SIZE,
            freeze: FreezeStatus::new(),
            inner: RwLock::new(Inner { storage, size }),
        }
    }

    // ---- introspection ---------------------------------------------------

    /// The full declared array/tuple type of this value
    pub fn declared_type(&self) -> &TypeDesc {
        &self.declared_type
    }

    /// The element type, when a single one is declared
    pub fn element_type(&self) -> Option<&TypeDesc> {
        self.element_type.as_ref()
    }

    /// Current logical element count
    pub fn len(&self) -> usize {
        self.inner.read().size
    }

    /// Whether the array holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The maximum logical length this instance may ever reach
    pub fn capacity_limit(&self) -> usize {
        self.capacity_limit
    }

    /// The kind of the active storage backend
    pub fn storage_kind(&self) -> StorageKind {
        self.inner.read().storage.kind()
    }

    /// The freeze status word shared with the freeze orchestrator
    pub fn freeze_status(&self) -> &FreezeStatus {
        &self.freeze
    }

    /// Clone out the logical contents of a byte array
    pub fn bytes(&self) -> ValueResult<Vec<u8>> {
        let inner = self.inner.read();
        match &inner.storage {
            Storage::Byte(values) => Ok(values[..inner.size.min(values.len())].to_vec()),
            other => Err(ValueError::storage_mismatch(
                StorageKind::Byte,
                other.kind(),
            )),
        }
    }

    // ---- indexed reads ---------------------------------------------------

    /// Get the int element at `index`
    pub fn get_int(&self, index: i64) -> ValueResult<i64> {
        let inner = self.inner.read();
        let idx = range_check_for_get(index, inner.size)?;
        match &inner.storage {
            Storage::Int(values) => read_slot(values, idx, index, inner.size).copied(),
            other => Err(ValueError::storage_mismatch(StorageKind::Int, other.kind())),
        }
    }

    /// Get the boolean element at `index`
    pub fn get_boolean(&self, index: i64) -> ValueResult<bool> {
        let inner = self.inner.read();
        let idx = range_check_for_get(index, inner.size)?;
        match &inner.storage {
            Storage::Boolean(values) => {
                Ok(*read_slot(values, idx, index, inner.size)? != 0)
            }
            other => Err(ValueError::storage_mismatch(
                StorageKind::Boolean,
                other.kind(),
            )),
        }
    }

    /// Get the byte element at `index`
    pub fn get_byte(&self, index: i64) -> ValueResult<u8> {
        let inner = self.inner.read();
        let idx = range_check_for_get(index, inner.size)?;
        match &inner.storage {
            Storage::Byte(values) => read_slot(values, idx, index, inner.size).copied(),
            other => Err(ValueError::storage_mismatch(
                StorageKind::Byte,
                other.kind(),
            )),
        }
    }

    /// Get the float element at `index`
    pub fn get_float(&self, index: i64) -> ValueResult<f64> {
        let inner = self.inner.read();
        let idx = range_check_for_get(index, inner.size)?;
        match &inner.storage {
            Storage::Float(values) => read_slot(values, idx, index, inner.size).copied(),
            other => Err(ValueError::storage_mismatch(
                StorageKind::Float,
                other.kind(),
            )),
        }
    }

    /// Get the string element at `index`
    pub fn get_string(&self, index: i64) -> ValueResult<String> {
        let inner = self.inner.read();
        let idx = range_check_for_get(index, inner.size)?;
        match &inner.storage {
            Storage::String(values) => read_slot(values, idx, index, inner.size).cloned(),
            other => Err(ValueError::storage_mismatch(
                StorageKind::String,
                other.kind(),
            )),
        }
    }

    /// Get the boxed element at `index`; `None` means the slot was never
    /// written and its type has no zero-value
    pub fn get_ref(&self, index: i64) -> ValueResult<Option<Value>> {
        let inner = self.inner.read();
        let idx = range_check_for_get(index, inner.size)?;
        match &inner.storage {
            Storage::Ref(values) => read_slot(values, idx, index, inner.size).cloned(),
            other => Err(ValueError::storage_mismatch(StorageKind::Ref, other.kind())),
        }
    }

    // ---- indexed writes --------------------------------------------------

    /// Write an int element at `index`, growing the array as needed
    pub fn add_int(&self, index: i64, value: i64) -> ValueResult<()> {
        let _status = self.freeze.guard_update()?;
        let mut inner = self.inner.write();
        if inner.storage.kind() != StorageKind::Int {
            return Err(ValueError::storage_mismatch(
                StorageKind::Int,
                inner.storage.kind(),
            ));
        }
        let idx = self.prepare_for_add(&mut inner, index)?;
        if let Storage::Int(values) = &mut inner.storage {
            values[idx] = value;
        }
        Ok(())
    }

    /// Write a boolean element at `index`, growing the array as needed.
    ///
    /// When the declared element type is int, the flag widens into the int
    /// backend instead: narrow values never introduce a second numeric
    /// representation into an integer array.
    pub fn add_boolean(&self, index: i64, value: bool) -> ValueResult<()> {
        if self.element_type.as_ref().map(TypeDesc::tag) == Some(TypeTag::Int) {
            return self.add_int(index, i64::from(value));
        }

        let _status = self.freeze.guard_update()?;
        let mut inner = self.inner.write();
        if inner.storage.kind() != StorageKind::Boolean {
            return Err(ValueError::storage_mismatch(
                StorageKind::Boolean,
                inner.storage.kind(),
            ));
        }
        let idx = self.prepare_for_add(&mut inner, index)?;
        if let Storage::Boolean(values) = &mut inner.storage {
            values[idx] = i32::from(value);
        }
        Ok(())
    }

    /// Write a byte element at `index`, growing the array as needed
    pub fn add_byte(&self, index: i64, value: u8) -> ValueResult<()> {
        let _status = self.freeze.guard_update()?;
        let mut inner = self.inner.write();
        if inner.storage.kind() != StorageKind::Byte {
            return Err(ValueError::storage_mismatch(
                StorageKind::Byte,
                inner.storage.kind(),
            ));
        }
        let idx = self.prepare_for_add(&mut inner, index)?;
        if let Storage::Byte(values) = &mut inner.storage {
            values[idx] = value;
        }
        Ok(())
    }

    /// Write a float element at `index`, growing the array as needed
    pub fn add_float(&self, index: i64, value: f64) -> ValueResult<()> {
        let _status = self.freeze.guard_update()?;
        let mut inner = self.inner.write();
        if inner.storage.kind() != StorageKind::Float {
            return Err(ValueError::storage_mismatch(
                StorageKind::Float,
                inner.storage.kind(),
            ));
        }
        let idx = self.prepare_for_add(&mut inner, index)?;
        if let Storage::Float(values) = &mut inner.storage {
            values[idx] = value;
        }
        Ok(())
    }

    /// Write a string element at `index`, growing the array as needed
    pub fn add_string(&self, index: i64, value: String) -> ValueResult<()> {
        let _status = self.freeze.guard_update()?;
        let mut inner = self.inner.write();
        if inner.storage.kind() != StorageKind::String {
            return Err(ValueError::storage_mismatch(
                StorageKind::String,
                inner.storage.kind(),
            ));
        }
        let idx = self.prepare_for_add(&mut inner, index)?;
        if let Storage::String(values) = &mut inner.storage {
            values[idx] = value;
        }
        Ok(())
    }

    /// Write a boxed element at `index`, growing the array as needed
    pub fn add_ref(&self, index: i64, value: Value) -> ValueResult<()> {
        let _status = self.freeze.guard_update()?;
        let mut inner = self.inner.write();
        if inner.storage.kind() != StorageKind::Ref {
            return Err(ValueError::storage_mismatch(
                StorageKind::Ref,
                inner.storage.kind(),
            ));
        }
        let idx = self.prepare_for_add(&mut inner, index)?;
        if let Storage::Ref(values) = &mut inner.storage {
            values[idx] = Some(value);
        }
        Ok(())
    }

    /// Append an int element at the current logical end
    pub fn append_int(&self, value: i64) -> ValueResult<()> {
        self.add_int(self.len() as i64, value)
    }

    /// Append a boolean element at the current logical end
    pub fn append_boolean(&self, value: bool) -> ValueResult<()> {
        self.add_boolean(self.len() as i64, value)
    }

    /// Append a byte element at the current logical end
    pub fn append_byte(&self, value: u8) -> ValueResult<()> {
        self.add_byte(self.len() as i64, value)
    }

    /// Append a float element at the current logical end
    pub fn append_float(&self, value: f64) -> ValueResult<()> {
        self.add_float(self.len() as i64, value)
    }

    /// Append a string element at the current logical end
    pub fn append_string(&self, value: String) -> ValueResult<()> {
        self.add_string(self.len() as i64, value)
    }

    /// Append a boxed element at the current logical end
    pub fn append_ref(&self, value: Value) -> ValueResult<()> {
        self.add_ref(self.len() as i64, value)
    }

    // ---- growth ----------------------------------------------------------

    /// Reallocate the active backend to exactly `new_length` slots.
    ///
    /// The first `min(old, new)` slots are preserved; new slots hold the
    /// backend default. This is the capacity primitive beneath the amortized
    /// growth policy; it does not touch the logical length.
    pub fn grow(&self, new_length: usize) {
        self.inner.write().storage.grow(new_length);
    }

    /// Bounds-check a write index and make room for it.
    ///
    /// The index is checked against the capacity limit, not the logical
    /// length: writing past the end is allowed up to the limit and extends
    /// the length (sparse-write-extends-length).
    fn prepare_for_add(&self, inner: &mut Inner, index: i64) -> ValueResult<usize> {
        check_representable(index)?;
        if index < 0 || index as usize >= self.capacity_limit {
            return Err(ValueError::index_out_of_range(index, inner.size));
        }
        let idx = index as usize;
        ensure_capacity(&mut inner.storage, idx + 1, self.capacity_limit);
        if idx >= inner.size {
            inner.size = idx + 1;
        }
        Ok(idx)
    }

    // ---- copy ------------------------------------------------------------

    /// Deep-copy this array.
    ///
    /// Frozen arrays are returned by identity; they can never be mutated
    /// through any alias, so sharing them is safe. `visited` maps original
    /// instances (by pointer) to their clones within one copy pass; an
    /// array reached twice yields the same clone, which both deduplicates
    /// shared sub-structure and terminates reference cycles.
    pub fn copy(self: &Arc<Self>, visited: &mut FxHashMap<usize, ArrayRef>) -> ArrayRef {
        if self.freeze.is_frozen() {
            return Arc::clone(self);
        }

        let key = Arc::as_ptr(self) as usize;
        if let Some(existing) = visited.get(&key) {
            return Arc::clone(existing);
        }

        // Snapshot under the read lock, then release it before recursing so
        // nested copies never re-enter this array's lock.
        let (size, slots) = {
            let inner = self.inner.read();
            let slots = match &inner.storage {
                Storage::Ref(values) => {
                    Some(values[..inner.size.min(values.len())].to_vec())
                }
                _ => None,
            };
            (inner.size, slots)
        };

        let Some(slots) = slots else {
            // Scalar and string backends: flat duplicate up to the logical
            // length, no recursion possible.
            let inner = self.inner.read();
            let clone = Arc::new(self.shell(inner.storage.clone_prefix(size), size));
            drop(inner);
            visited.insert(key, Arc::clone(&clone));
            return clone;
        };

        // Register the clone before recursing into children; a cycle back
        // to this array must resolve to the clone, not the original.
        let clone = Arc::new(self.shell(Storage::Ref(vec![None; size]), size));
        visited.insert(key, Arc::clone(&clone));

        let copied: Vec<Option<Value>> = slots
            .into_iter()
            .map(|slot| match slot {
                Some(Value::Array(child)) => Some(Value::Array(child.copy(visited))),
                other => other,
            })
            .collect();
        clone.inner.write().storage = Storage::Ref(copied);
        clone
    }

    /// A structurally empty twin: same declared type, element type, and
    /// capacity limit, fresh unfrozen status.
    fn shell(&self, storage: Storage, size: usize) -> ArrayValue {
        ArrayValue {
            declared_type: self.declared_type.clone(),
            element_type: self.element_type.clone(),
            capacity_limit: self.capacity_limit,
            freeze: FreezeStatus::new(),
            inner: RwLock::new(Inner { storage, size }),
        }
    }

    // ---- serialization ---------------------------------------------------

    /// Drain this array into a byte sink.
    ///
    /// Byte arrays are written as raw binary; every other backend writes
    /// the UTF-8 textual rendering. Sink failures surface immediately and
    /// are never retried.
    pub fn serialize<W: io::Write>(&self, sink: &mut W) -> ValueResult<()> {
        let inner = self.inner.read();
        if let Storage::Byte(values) = &inner.storage {
            let upto = inner.size.min(values.len());
            return sink.write_all(&values[..upto]).map_err(ValueError::BinaryWrite);
        }
        drop(inner);
        sink.write_all(self.to_string().as_bytes())
            .map_err(ValueError::Serialization)
    }
}

impl Default for ArrayValue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArrayValue {
    /// Bracketed, comma-space-joined rendering: `[..]` for arrays, `(..)`
    /// for tuples. String elements are double-quoted; unset boxed slots are
    /// skipped entirely.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        let size = inner.size;
        let mut parts: Vec<String> = Vec::with_capacity(size);
        let mut delimiters = ("[", "]");
        match &inner.storage {
            Storage::Int(values) => {
                parts.extend(values.iter().take(size).map(|v| v.to_string()));
            }
            Storage::Boolean(values) => {
                parts.extend(values.iter().take(size).map(|v| (*v != 0).to_string()));
            }
            Storage::Byte(values) => {
                parts.extend(values.iter().take(size).map(|v| v.to_string()));
            }
            Storage::Float(values) => {
                parts.extend(values.iter().take(size).map(|v| format_float(*v)));
            }
            Storage::String(values) => {
                parts.extend(values.iter().take(size).map(|v| format!("\"{}\"", v)));
            }
            Storage::Ref(values) => {
                if matches!(self.declared_type, TypeDesc::Tuple(_)) {
                    delimiters = ("(", ")");
                }
                for slot in values.iter().take(size) {
                    match slot {
                        None => continue,
                        Some(value) if value.type_tag() == TypeTag::String => {
                            parts.push(format!("\"{}\"", value));
                        }
                        Some(value) => parts.push(value.to_string()),
                    }
                }
            }
        }
        write!(f, "{}{}{}", delimiters.0, parts.join(", "), delimiters.1)
    }
}

/// Reject indexes outside the 32-bit index domain before any bounds
/// comparison.
fn check_representable(index: i64) -> ValueResult<()> {
    if index > i64::from(i32::MAX) || index < i64::from(i32::MIN) {
        return Err(ValueError::index_too_large(index));
    }
    Ok(())
}

fn range_check_for_get(index: i64, size: usize) -> ValueResult<usize> {
    check_representable(index)?;
    if index < 0 || index as usize >= size {
        return Err(ValueError::index_out_of_range(index, size));
    }
    Ok(index as usize)
}

/// Read a slot that bounds checks said exists. The physical buffer can
/// still be shorter after an external truncating [`ArrayValue::grow`]; that
/// reports out-of-range instead of panicking.
fn read_slot<'a, T>(values: &'a [T], idx: usize, index: i64, size: usize) -> ValueResult<&'a T> {
    values
        .get(idx)
        .ok_or_else(|| ValueError::index_out_of_range(index, size))
}

/// Amortized growth: 1.5x the current physical size, at least `requested`,
/// never beyond `capacity_limit`. Saturating arithmetic keeps the policy
/// well-defined near the representable maximum.
fn ensure_capacity(storage: &mut Storage, requested: usize, capacity_limit: usize) {
    let physical = storage.physical_size();
    if requested <= physical {
        return;
    }
    let mut new_size = physical.saturating_add(physical >> 1);
    new_size = new_size.max(requested);
    new_size = new_size.min(capacity_limit);
    storage.grow(new_size);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ints_roundtrip() {
        let arr = ArrayValue::from_ints(vec![1, 2, 3]);
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.storage_kind(), StorageKind::Int);
        assert_eq!(arr.get_int(0).unwrap(), 1);
        assert_eq!(arr.get_int(2).unwrap(), 3);
    }

    #[test]
    fn test_get_past_length_fails() {
        let arr = ArrayValue::from_ints(vec![1, 2, 3]);
        match arr.get_int(3) {
            Err(ValueError::IndexOutOfRange { index: 3, size: 3 }) => {}
            other => panic!("expected out of range, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_index_fails() {
        let arr = ArrayValue::from_floats(vec![1.0]);
        assert!(matches!(
            arr.get_float(-1),
            Err(ValueError::IndexOutOfRange { index: -1, .. })
        ));
        assert!(matches!(
            arr.add_float(-1, 2.0),
            Err(ValueError::IndexOutOfRange { index: -1, .. })
        ));
    }

    #[test]
    fn test_index_too_large_precedes_bounds() {
        let arr = ArrayValue::from_ints(vec![]);
        let index = i64::from(i32::MAX) + 1;
        assert!(matches!(
            arr.get_int(index),
            Err(ValueError::IndexTooLarge { .. })
        ));
        assert!(matches!(
            arr.add_int(index, 1),
            Err(ValueError::IndexTooLarge { .. })
        ));
    }

    #[test]
    fn test_sparse_add_extends_length() {
        let arr = ArrayValue::new_with_type(&TypeDesc::Int);
        arr.add_int(5, 42).unwrap();
        assert_eq!(arr.len(), 6);
        assert_eq!(arr.get_int(5).unwrap(), 42);
        for i in 0..5 {
            assert_eq!(arr.get_int(i).unwrap(), 0);
        }
    }

    #[test]
    fn test_append_after_default_capacity() {
        let arr = ArrayValue::new_with_type(&TypeDesc::Int);
        for i in 0..150 {
            arr.append_int(i).unwrap();
        }
        assert_eq!(arr.len(), 150);
        for i in 0..150 {
            assert_eq!(arr.get_int(i).unwrap(), i);
        }
    }

    #[test]
    fn test_growth_is_clamped_to_capacity_limit() {
        let arr = ArrayValue::with_size(&TypeDesc::Int, Some(4));
        assert_eq!(arr.capacity_limit(), 4);
        assert!(matches!(
            arr.add_int(4, 1),
            Err(ValueError::IndexOutOfRange { index: 4, .. })
        ));
        arr.add_int(3, 7).unwrap();
        assert_eq!(arr.get_int(3).unwrap(), 7);
    }

    #[test]
    fn test_growth_factor_bound() {
        let arr = ArrayValue::new_with_type(&TypeDesc::Int);
        assert_eq!(arr.inner.read().storage.physical_size(), DEFAULT_ARRAY_SIZE);
        arr.add_int(150, 5).unwrap();
        let physical = arr.inner.read().storage.physical_size();
        assert!(physical >= 151);
        assert!(physical <= arr.capacity_limit());
        assert_eq!(arr.get_int(150).unwrap(), 5);
    }

    #[test]
    fn test_boolean_flags() {
        let arr = ArrayValue::from_booleans(vec![true, false]);
        assert!(arr.get_boolean(0).unwrap());
        assert!(!arr.get_boolean(1).unwrap());
        arr.add_boolean(2, true).unwrap();
        assert!(arr.get_boolean(2).unwrap());
    }

    #[test]
    fn test_boolean_add_widens_into_int_array() {
        let arr = ArrayValue::new_with_type(&TypeDesc::Int);
        arr.add_boolean(0, true).unwrap();
        assert_eq!(arr.get_int(0).unwrap(), 1);
        assert_eq!(arr.storage_kind(), StorageKind::Int);
    }

    #[test]
    fn test_string_slots_default_to_empty() {
        let arr = ArrayValue::new_with_type(&TypeDesc::String);
        arr.add_string(2, "c".to_string()).unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get_string(0).unwrap(), "");
        assert_eq!(arr.get_string(2).unwrap(), "c");
    }

    #[test]
    fn test_storage_mismatch_reported() {
        let arr = ArrayValue::from_ints(vec![1]);
        assert!(matches!(
            arr.get_float(0),
            Err(ValueError::StorageMismatch {
                expected: StorageKind::Float,
                actual: StorageKind::Int,
            })
        ));
        assert!(matches!(
            arr.add_string(0, String::new()),
            Err(ValueError::StorageMismatch { .. })
        ));
    }

    #[test]
    fn test_frozen_rejects_mutation() {
        let arr = ArrayValue::from_ints(vec![1, 2]);
        arr.freeze_status().commit_freeze();
        assert!(matches!(
            arr.add_int(0, 9),
            Err(ValueError::FrozenUpdate)
        ));
        assert!(matches!(arr.append_int(9), Err(ValueError::FrozenUpdate)));
        assert_eq!(arr.len(), 2);
        assert_eq!(arr.get_int(0).unwrap(), 1);
    }

    #[test]
    fn test_freeze_in_progress_rejects_mutation() {
        let arr = ArrayValue::from_ints(vec![1]);
        arr.freeze_status().begin_freeze();
        assert!(matches!(
            arr.add_int(0, 9),
            Err(ValueError::FrozenUpdate)
        ));
    }

    #[test]
    fn test_tuple_construction_and_bound() {
        let ty = TypeDesc::tuple(vec![TypeDesc::Int, TypeDesc::String, TypeDesc::Float]);
        let arr = ArrayValue::new_with_type(&ty);
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.capacity_limit(), 3);
        assert!(matches!(arr.get_ref(0).unwrap(), Some(Value::Int(0))));
        assert!(matches!(
            arr.add_ref(3, Value::Int(1)),
            Err(ValueError::IndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_sealed_ref_array_prefilled_with_zero() {
        let ty = TypeDesc::sealed_array(TypeDesc::String, 2);
        let arr = ArrayValue::new_with_type(&ty);
        assert_eq!(arr.len(), 2);
        match arr.get_ref(1).unwrap() {
            Some(Value::String(s)) => assert_eq!(s, ""),
            other => panic!("expected empty string zero, got {:?}", other),
        }
    }

    #[test]
    fn test_grow_preserves_prefix() {
        let arr = ArrayValue::from_bytes(vec![1, 2, 3]);
        arr.grow(10);
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get_byte(2).unwrap(), 3);
    }

    #[test]
    fn test_display_scalars() {
        assert_eq!(ArrayValue::from_ints(vec![1, 2]).to_string(), "[1, 2]");
        assert_eq!(
            ArrayValue::from_booleans(vec![true, false]).to_string(),
            "[true, false]"
        );
        assert_eq!(ArrayValue::from_bytes(vec![0, 255]).to_string(), "[0, 255]");
        assert_eq!(
            ArrayValue::from_floats(vec![1.5, 2.0]).to_string(),
            "[1.5, 2.0]"
        );
        assert_eq!(
            ArrayValue::from_strings(vec!["a".into(), "b".into()]).to_string(),
            "[\"a\", \"b\"]"
        );
    }

    #[test]
    fn test_display_skips_absent_slots() {
        let arr = ArrayValue::from_refs(
            vec![Some(Value::Int(1)), None, Some(Value::Int(3))],
            TypeDesc::array(TypeDesc::Any),
        );
        assert_eq!(arr.to_string(), "[1, 3]");
    }

    #[test]
    fn test_display_tuple_quotes_strings() {
        let ty = TypeDesc::tuple(vec![TypeDesc::Int, TypeDesc::String]);
        let arr = ArrayValue::new_with_type(&ty);
        arr.add_ref(0, Value::Int(7)).unwrap();
        arr.add_ref(1, Value::String("hi".into())).unwrap();
        assert_eq!(arr.to_string(), "(7, \"hi\")");
    }

    #[test]
    fn test_serialize_bytes_is_binary_passthrough() {
        let arr = ArrayValue::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        let mut sink = Vec::new();
        arr.serialize(&mut sink).unwrap();
        assert_eq!(sink, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_serialize_text_for_other_backends() {
        let arr = ArrayValue::from_ints(vec![1, 2]);
        let mut sink = Vec::new();
        arr.serialize(&mut sink).unwrap();
        assert_eq!(String::from_utf8(sink).unwrap(), "[1, 2]");
    }

    #[test]
    fn test_serialize_surfaces_sink_errors() {
        struct FailingSink;
        impl io::Write for FailingSink {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("sink closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let arr = ArrayValue::from_bytes(vec![1]);
        assert!(matches!(
            arr.serialize(&mut FailingSink),
            Err(ValueError::BinaryWrite(_))
        ));
        let arr = ArrayValue::from_ints(vec![1]);
        assert!(matches!(
            arr.serialize(&mut FailingSink),
            Err(ValueError::Serialization(_))
        ));
    }

    #[test]
    fn test_copy_scalar_is_independent() {
        let arr: ArrayRef = Arc::new(ArrayValue::from_ints(vec![1, 2, 3]));
        let mut visited = FxHashMap::default();
        let copy = arr.copy(&mut visited);
        assert!(!Arc::ptr_eq(&arr, &copy));
        copy.add_int(0, 99).unwrap();
        assert_eq!(arr.get_int(0).unwrap(), 1);
        assert_eq!(copy.get_int(0).unwrap(), 99);
    }

    #[test]
    fn test_copy_frozen_returns_identity() {
        let arr: ArrayRef = Arc::new(ArrayValue::from_ints(vec![1]));
        arr.freeze_status().commit_freeze();
        let mut visited = FxHashMap::default();
        let copy = arr.copy(&mut visited);
        assert!(Arc::ptr_eq(&arr, &copy));
    }

    #[test]
    fn test_copy_breaks_cycles() {
        let arr: ArrayRef = Arc::new(ArrayValue::new());
        arr.add_ref(0, Value::Array(Arc::clone(&arr))).unwrap();

        let mut visited = FxHashMap::default();
        let copy = arr.copy(&mut visited);

        assert!(!Arc::ptr_eq(&arr, &copy));
        match copy.get_ref(0).unwrap() {
            Some(Value::Array(child)) => assert!(Arc::ptr_eq(&child, &copy)),
            other => panic!("expected self-referential copy, got {:?}", other),
        }
    }

    #[test]
    fn test_copy_shares_duplicate_children() {
        let shared: ArrayRef = Arc::new(ArrayValue::from_ints(vec![7]));
        let arr: ArrayRef = Arc::new(ArrayValue::new());
        arr.add_ref(0, Value::Array(Arc::clone(&shared))).unwrap();
        arr.add_ref(1, Value::Array(Arc::clone(&shared))).unwrap();

        let mut visited = FxHashMap::default();
        let copy = arr.copy(&mut visited);

        let first = copy.get_ref(0).unwrap();
        let second = copy.get_ref(1).unwrap();
        match (first, second) {
            (Some(Value::Array(a)), Some(Value::Array(b))) => {
                assert!(Arc::ptr_eq(&a, &b));
                assert!(!Arc::ptr_eq(&a, &shared));
            }
            other => panic!("expected two array children, got {:?}", other),
        }
    }

    #[test]
    fn test_bytes_clones_logical_contents() {
        let arr = ArrayValue::new_with_type(&TypeDesc::Byte);
        arr.append_byte(9).unwrap();
        arr.append_byte(8).unwrap();
        assert_eq!(arr.bytes().unwrap(), vec![9, 8]);
        assert!(ArrayValue::from_ints(vec![]).bytes().is_err());
    }
}
