//! VM-side class, method and program descriptors.
//!
//! The collector never parses source; everything it needs to trace the heap
//! is tabulated here: per-class declaration lists (with enough kind
//! information to know which slots hold references), the parent hierarchy,
//! interface implementation tables, and closure layouts for function-valued
//! slots.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Terminates every row of the exported interface table.
pub const INF_ENDING: i64 = -1;

// =============================================================================
// Declaration kinds
// =============================================================================

/// Kind of a declared slot in instance, class or frame memory.
///
/// The kind determines both the slot's width in words and whether the
/// collector must treat its contents as a heap reference:
///
/// - scalars (`Int`, `Char`, `Byte`, `Float`) occupy one word and are opaque
/// - flat arrays occupy one word holding an array payload pointer
/// - `Obj` holds an object payload pointer traced through its class
/// - `ObjArray` holds an array of object payload pointers
/// - `Func` occupies two words: a packed `(class_id << 16) | method_id`
///   identity and a captured-closure payload pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// Integer scalar.
    Int,
    /// Character scalar.
    Char,
    /// Byte scalar.
    Byte,
    /// Float scalar.
    Float,
    /// Function value: packed method identity plus closure pointer.
    Func,
    /// Object reference.
    Obj,
    /// Byte array reference.
    ByteArray,
    /// Character array reference.
    CharArray,
    /// Integer array reference.
    IntArray,
    /// Float array reference.
    FloatArray,
    /// Object array reference.
    ObjArray,
}

impl MemoryKind {
    /// Width of the slot in words.
    #[inline]
    pub fn width(self) -> usize {
        match self {
            MemoryKind::Func => 2,
            _ => 1,
        }
    }
}

/// A declared slot: kind plus the variable name it was compiled from.
#[derive(Debug, Clone)]
pub struct StackDclr {
    /// Slot kind.
    pub kind: MemoryKind,
    /// Fully qualified variable name.
    pub name: String,
}

impl StackDclr {
    /// Create a declaration.
    pub fn new(kind: MemoryKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

// =============================================================================
// Allocation tags
// =============================================================================

/// Tag stored in an allocation's `TYPE` header word.
///
/// `Nil` marks an object instance (its `SIZE_OR_CLS` word holds the class
/// id); the remaining tags mark arrays (`SIZE_OR_CLS` holds the payload
/// size in bytes). `Int` arrays double as object-reference arrays, which is
/// why the collector scans both `Nil` and `Int` tagged payloads when it
/// encounters memory without a class mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum MemoryTag {
    /// Object instance.
    Nil = 0,
    /// Byte array.
    ByteArray = 1,
    /// Character array.
    CharArray = 2,
    /// Integer (or object reference) array.
    Int = 3,
    /// Float array.
    Float = 4,
}

impl MemoryTag {
    /// Decode a raw header word; unknown values return `None`.
    #[inline]
    pub fn from_word(word: usize) -> Option<Self> {
        match word {
            0 => Some(MemoryTag::Nil),
            1 => Some(MemoryTag::ByteArray),
            2 => Some(MemoryTag::CharArray),
            3 => Some(MemoryTag::Int),
            4 => Some(MemoryTag::Float),
            _ => None,
        }
    }
}

// =============================================================================
// Methods
// =============================================================================

/// An executable method descriptor.
#[derive(Debug)]
pub struct StackMethod {
    /// Method id, unique within its class.
    pub id: usize,
    /// Fully qualified method name.
    pub name: String,
    /// Owning class id.
    pub cls_id: usize,
    /// Declared frame slots, in layout order.
    pub dclrs: Vec<StackDclr>,
    /// Lambdas carry no `self`; slot 0 is a regular declaration.
    pub is_lambda: bool,
    /// Whether the frame reserves an extra logical-operator temp slot.
    pub has_and_or: bool,
}

impl StackMethod {
    /// Create a method descriptor.
    pub fn new(id: usize, cls_id: usize, name: impl Into<String>, dclrs: Vec<StackDclr>) -> Self {
        Self {
            id,
            name: name.into(),
            cls_id,
            dclrs,
            is_lambda: false,
            has_and_or: false,
        }
    }
}

// =============================================================================
// Classes
// =============================================================================

/// A loaded class descriptor.
pub struct StackClass {
    /// Class id; also its index in the program's class table.
    pub id: usize,
    /// Fully qualified class name.
    pub name: String,
    /// Instance payload size in bytes.
    pub instance_size: usize,
    /// Instance slot declarations, in layout order.
    pub instance_dclrs: Vec<StackDclr>,
    /// Class (static) slot declarations, in layout order.
    pub class_dclrs: Vec<StackDclr>,
    /// Backing words for the class (static) slots.
    class_mem: Mutex<Vec<usize>>,
    /// Methods keyed by id.
    methods: FxHashMap<usize, StackMethod>,
    /// Captured-variable layouts for lambda methods, keyed by method id.
    closure_dclrs: FxHashMap<usize, Vec<StackDclr>>,
}

impl StackClass {
    /// Create a class descriptor with zeroed static memory.
    pub fn new(
        id: usize,
        name: impl Into<String>,
        instance_size: usize,
        instance_dclrs: Vec<StackDclr>,
        class_dclrs: Vec<StackDclr>,
    ) -> Self {
        let static_words: usize = class_dclrs.iter().map(|d| d.kind.width()).sum();
        Self {
            id,
            name: name.into(),
            instance_size,
            instance_dclrs,
            class_dclrs,
            class_mem: Mutex::new(vec![0; static_words]),
            methods: FxHashMap::default(),
            closure_dclrs: FxHashMap::default(),
        }
    }

    /// Register a method.
    pub fn add_method(&mut self, method: StackMethod) {
        self.methods.insert(method.id, method);
    }

    /// Look up a method by id.
    pub fn method(&self, id: usize) -> Option<&StackMethod> {
        self.methods.get(&id)
    }

    /// Register the captured-variable layout of a lambda method.
    pub fn add_closure_dclrs(&mut self, mthd_id: usize, dclrs: Vec<StackDclr>) {
        self.closure_dclrs.insert(mthd_id, dclrs);
    }

    /// Captured-variable layout for a lambda method, if any.
    pub fn closure_dclrs(&self, mthd_id: usize) -> &[StackDclr] {
        self.closure_dclrs.get(&mthd_id).map_or(&[], Vec::as_slice)
    }

    /// Run `f` over the class (static) memory words.
    ///
    /// The lock scope is the duration of `f`; callers must not re-enter.
    pub fn with_class_mem<R>(&self, f: impl FnOnce(&mut [usize]) -> R) -> R {
        f(&mut self.class_mem.lock())
    }
}

impl std::fmt::Debug for StackClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("instance_size", &self.instance_size)
            .field("methods", &self.methods.len())
            .finish()
    }
}

// =============================================================================
// Program
// =============================================================================

/// The loaded program: class table plus the flattened hierarchy and
/// interface tables runtime casts consult.
#[derive(Debug, Default)]
pub struct StackProgram {
    classes: Vec<StackClass>,
    /// Parent class id per class id; `-1` for roots.
    hierarchy: Vec<i64>,
    /// Implemented interface ids per class id, `INF_ENDING`-terminated.
    interfaces: Vec<Vec<i64>>,
}

impl StackProgram {
    /// Create an empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a class; its id must equal the current class count.
    ///
    /// `parent_id` is `-1` for hierarchy roots. `interface_ids` lists the
    /// implemented interfaces; the terminating sentinel is appended here.
    pub fn add_class(&mut self, cls: StackClass, parent_id: i64, interface_ids: &[i64]) {
        debug_assert_eq!(cls.id, self.classes.len());
        self.classes.push(cls);
        self.hierarchy.push(parent_id);
        let mut row: Vec<i64> = interface_ids.to_vec();
        row.push(INF_ENDING);
        self.interfaces.push(row);
    }

    /// Look up a class by id.
    #[inline]
    pub fn class(&self, id: usize) -> Option<&StackClass> {
        self.classes.get(id)
    }

    /// Mutable class lookup, for loaders.
    #[inline]
    pub fn class_mut(&mut self, id: usize) -> Option<&mut StackClass> {
        self.classes.get_mut(id)
    }

    /// All loaded classes.
    #[inline]
    pub fn classes(&self) -> &[StackClass] {
        &self.classes
    }

    /// Parent id table indexed by class id (`-1` = none).
    #[inline]
    pub fn hierarchy(&self) -> &[i64] {
        &self.hierarchy
    }

    /// Interface table indexed by class id; rows end with [`INF_ENDING`].
    #[inline]
    pub fn interfaces(&self) -> &[Vec<i64>] {
        &self.interfaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_widths() {
        assert_eq!(MemoryKind::Int.width(), 1);
        assert_eq!(MemoryKind::Obj.width(), 1);
        assert_eq!(MemoryKind::Func.width(), 2);
    }

    #[test]
    fn test_class_static_memory_sized_by_declarations() {
        let cls = StackClass::new(
            0,
            "System.Base",
            8,
            vec![],
            vec![
                StackDclr::new(MemoryKind::Int, "System.Base:counter"),
                StackDclr::new(MemoryKind::Func, "System.Base:hook"),
            ],
        );
        cls.with_class_mem(|mem| assert_eq!(mem.len(), 3));
    }

    #[test]
    fn test_program_tables() {
        let mut prgm = StackProgram::new();
        prgm.add_class(StackClass::new(0, "System.Base", 8, vec![], vec![]), -1, &[]);
        prgm.add_class(StackClass::new(1, "App.Point", 16, vec![], vec![]), 0, &[3]);

        assert_eq!(prgm.hierarchy(), &[-1, 0]);
        assert_eq!(prgm.interfaces()[1], vec![3, INF_ENDING]);
        assert_eq!(prgm.class(1).unwrap().name, "App.Point");
    }

    #[test]
    fn test_closure_declarations_default_empty() {
        let cls = StackClass::new(0, "System.Base", 8, vec![], vec![]);
        assert!(cls.closure_dclrs(7).is_empty());
    }

    #[test]
    fn test_memory_tag_round_trip() {
        for tag in [
            MemoryTag::Nil,
            MemoryTag::ByteArray,
            MemoryTag::CharArray,
            MemoryTag::Int,
            MemoryTag::Float,
        ] {
            assert_eq!(MemoryTag::from_word(tag as usize), Some(tag));
        }
        assert_eq!(MemoryTag::from_word(99), None);
    }
}
