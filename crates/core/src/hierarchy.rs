//! Type hierarchy queries and the common-ancestor resolver used when verifier
//! metadata has to merge two reference types.
//!
//! Lookups consult the program being rewritten first and fall back to an
//! external [`TypeInfoSource`]. Nothing here loads or links classes; a name that
//! neither source knows simply has no edges, and every question asked about it
//! degrades to the universal root.

use crate::access::AccessFlags;
use crate::program::{OBJECT, Program};
use std::collections::{HashSet, VecDeque};

/// Super-type and interface edges of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeEdges {
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
}

/// Anything that can describe the direct edges of a type by internal name.
pub trait TypeInfoSource {
    /// `None` when the type is unknown to this source.
    fn edges(&self, name: &str) -> Option<TypeEdges>;

    /// Whether the type itself declares an overridable method with this
    /// signature. `None` when the source cannot tell.
    fn declares_method(&self, _owner: &str, _name: &str, _desc: &str) -> Option<bool> {
        None
    }
}

impl TypeInfoSource for Program {
    fn edges(&self, name: &str) -> Option<TypeEdges> {
        self.get(name).map(|ty| TypeEdges {
            super_name: ty.super_name.clone(),
            interfaces: ty.interfaces.clone(),
            is_interface: ty.access.contains(AccessFlags::INTERFACE),
        })
    }
}

/// Built-in description of the platform types a rewritten program most often
/// touches: the throwable hierarchy, boxed numbers, strings and collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformTypes;

impl PlatformTypes {
    fn superclass(name: &str) -> Option<&'static str> {
        Some(match name {
            "java/lang/Throwable"
            | "java/lang/Number"
            | "java/lang/String"
            | "java/lang/Boolean"
            | "java/lang/Character"
            | "java/lang/Class"
            | "java/lang/Enum"
            | "java/lang/Record"
            | "java/lang/Thread"
            | "java/lang/AbstractStringBuilder"
            | "java/util/AbstractCollection"
            | "java/util/AbstractMap"
            | "java/io/InputStream"
            | "java/io/OutputStream"
            | "java/io/Reader"
            | "java/io/Writer" => OBJECT,
            "java/lang/Exception" | "java/lang/Error" => "java/lang/Throwable",
            "java/lang/RuntimeException"
            | "java/lang/InterruptedException"
            | "java/lang/ReflectiveOperationException"
            | "java/lang/CloneNotSupportedException"
            | "java/io/IOException"
            | "java/security/GeneralSecurityException" => "java/lang/Exception",
            "java/lang/ClassNotFoundException" | "java/lang/NoSuchMethodException" => {
                "java/lang/ReflectiveOperationException"
            }
            "java/lang/ArithmeticException"
            | "java/lang/NullPointerException"
            | "java/lang/ClassCastException"
            | "java/lang/IndexOutOfBoundsException"
            | "java/lang/NegativeArraySizeException"
            | "java/lang/IllegalArgumentException"
            | "java/lang/IllegalStateException"
            | "java/lang/UnsupportedOperationException"
            | "java/lang/ArrayStoreException"
            | "java/util/NoSuchElementException"
            | "java/util/ConcurrentModificationException" => "java/lang/RuntimeException",
            "java/lang/ArrayIndexOutOfBoundsException"
            | "java/lang/StringIndexOutOfBoundsException" => {
                "java/lang/IndexOutOfBoundsException"
            }
            "java/lang/NumberFormatException" => "java/lang/IllegalArgumentException",
            "java/io/FileNotFoundException" => "java/io/IOException",
            "java/io/UncheckedIOException" => "java/lang/RuntimeException",
            "java/lang/StackOverflowError" | "java/lang/OutOfMemoryError" => {
                "java/lang/VirtualMachineError"
            }
            "java/lang/VirtualMachineError"
            | "java/lang/LinkageError"
            | "java/lang/AssertionError" => "java/lang/Error",
            "java/lang/Integer"
            | "java/lang/Long"
            | "java/lang/Short"
            | "java/lang/Byte"
            | "java/lang/Float"
            | "java/lang/Double" => "java/lang/Number",
            "java/lang/StringBuilder" | "java/lang/StringBuffer" => {
                "java/lang/AbstractStringBuilder"
            }
            "java/util/AbstractList" | "java/util/AbstractSet" => "java/util/AbstractCollection",
            "java/util/ArrayList" => "java/util/AbstractList",
            "java/util/HashSet" => "java/util/AbstractSet",
            "java/util/HashMap" | "java/util/TreeMap" => "java/util/AbstractMap",
            "java/io/PrintStream" => "java/io/FilterOutputStream",
            "java/io/FilterOutputStream" => "java/io/OutputStream",
            _ => return None,
        })
    }

    fn interfaces(name: &str) -> &'static [&'static str] {
        match name {
            "java/lang/Throwable" | "java/lang/Number" => &["java/io/Serializable"],
            "java/lang/String" => &[
                "java/io/Serializable",
                "java/lang/Comparable",
                "java/lang/CharSequence",
            ],
            "java/lang/Integer"
            | "java/lang/Long"
            | "java/lang/Short"
            | "java/lang/Byte"
            | "java/lang/Float"
            | "java/lang/Double"
            | "java/lang/Boolean"
            | "java/lang/Character" => &["java/lang/Comparable"],
            "java/lang/AbstractStringBuilder" => &["java/lang/Appendable", "java/lang/CharSequence"],
            "java/util/AbstractCollection" => &["java/util/Collection"],
            "java/util/AbstractList" => &["java/util/List"],
            "java/util/AbstractSet" => &["java/util/Set"],
            "java/util/AbstractMap" => &["java/util/Map"],
            "java/util/ArrayList" => &["java/util/List", "java/util/RandomAccess"],
            "java/util/List" | "java/util/Set" => &["java/util/Collection"],
            "java/util/Collection" => &["java/lang/Iterable"],
            "java/util/TreeMap" => &["java/util/NavigableMap"],
            "java/util/NavigableMap" => &["java/util/SortedMap"],
            "java/util/SortedMap" => &["java/util/Map"],
            "java/lang/Thread" => &["java/lang/Runnable"],
            "java/io/InputStream" | "java/io/OutputStream" => &["java/io/Closeable"],
            "java/io/Closeable" => &["java/lang/AutoCloseable"],
            _ => &[],
        }
    }

    fn is_interface(name: &str) -> bool {
        matches!(
            name,
            "java/io/Serializable"
                | "java/io/Closeable"
                | "java/lang/AutoCloseable"
                | "java/lang/Comparable"
                | "java/lang/CharSequence"
                | "java/lang/Appendable"
                | "java/lang/Iterable"
                | "java/lang/Runnable"
                | "java/lang/Cloneable"
                | "java/util/Collection"
                | "java/util/List"
                | "java/util/Set"
                | "java/util/Map"
                | "java/util/SortedMap"
                | "java/util/NavigableMap"
                | "java/util/RandomAccess"
        )
    }
}

impl PlatformTypes {
    /// Overridable methods of the platform types whose member list is modelled
    /// completely. Types missing here answer "unknown".
    fn methods(name: &str) -> Option<&'static [(&'static str, &'static str)]> {
        const THROWABLE_METHODS: &[(&str, &str)] = &[
            ("getMessage", "()Ljava/lang/String;"),
            ("getLocalizedMessage", "()Ljava/lang/String;"),
            ("getCause", "()Ljava/lang/Throwable;"),
            ("initCause", "(Ljava/lang/Throwable;)Ljava/lang/Throwable;"),
            ("fillInStackTrace", "()Ljava/lang/Throwable;"),
            ("printStackTrace", "()V"),
            ("printStackTrace", "(Ljava/io/PrintStream;)V"),
            ("printStackTrace", "(Ljava/io/PrintWriter;)V"),
            ("getStackTrace", "()[Ljava/lang/StackTraceElement;"),
            ("setStackTrace", "([Ljava/lang/StackTraceElement;)V"),
            ("toString", "()Ljava/lang/String;"),
        ];
        // exceptions in the table that declare overridable members of their own
        const EXTENDED_THROWABLES: &[&str] = &["java/lang/ClassNotFoundException"];
        Some(match name {
            OBJECT => &[
                ("toString", "()Ljava/lang/String;"),
                ("hashCode", "()I"),
                ("equals", "(Ljava/lang/Object;)Z"),
                ("clone", "()Ljava/lang/Object;"),
                ("finalize", "()V"),
            ],
            "java/lang/Runnable" => &[("run", "()V")],
            "java/lang/Comparable" => &[("compareTo", "(Ljava/lang/Object;)I")],
            "java/lang/AutoCloseable" | "java/io/Closeable" => &[("close", "()V")],
            "java/lang/Iterable" => &[
                ("iterator", "()Ljava/util/Iterator;"),
                ("forEach", "(Ljava/util/function/Consumer;)V"),
                ("spliterator", "()Ljava/util/Spliterator;"),
            ],
            "java/lang/CharSequence" => &[
                ("length", "()I"),
                ("charAt", "(I)C"),
                ("isEmpty", "()Z"),
                ("subSequence", "(II)Ljava/lang/CharSequence;"),
                ("toString", "()Ljava/lang/String;"),
                ("chars", "()Ljava/util/stream/IntStream;"),
                ("codePoints", "()Ljava/util/stream/IntStream;"),
            ],
            "java/lang/Number" => &[
                ("intValue", "()I"),
                ("longValue", "()J"),
                ("floatValue", "()F"),
                ("doubleValue", "()D"),
                ("byteValue", "()B"),
                ("shortValue", "()S"),
            ],
            "java/lang/Throwable" => THROWABLE_METHODS,
            "java/io/Serializable" | "java/lang/Cloneable" | "java/util/RandomAccess" => &[],
            other if EXTENDED_THROWABLES.contains(&other) => return None,
            other if other.ends_with("Exception") || other.ends_with("Error") => {
                Self::superclass(other)?;
                &[]
            }
            _ => return None,
        })
    }
}

impl TypeInfoSource for PlatformTypes {
    fn declares_method(&self, owner: &str, name: &str, desc: &str) -> Option<bool> {
        Self::methods(owner).map(|ms| ms.iter().any(|&(n, d)| n == name && d == desc))
    }

    fn edges(&self, name: &str) -> Option<TypeEdges> {
        if name == OBJECT {
            return Some(TypeEdges {
                super_name: None,
                interfaces: Vec::new(),
                is_interface: false,
            });
        }
        let is_interface = Self::is_interface(name);
        let super_name = match Self::superclass(name) {
            Some(s) => s,
            None if is_interface => OBJECT,
            None => return None,
        };
        Some(TypeEdges {
            super_name: Some(super_name.to_string()),
            interfaces: Self::interfaces(name).iter().map(|s| s.to_string()).collect(),
            is_interface,
        })
    }
}

/// Answers "most specific common ancestor" and "is assignable" questions over
/// the program plus an external fallback, without loading anything.
#[derive(Clone, Copy)]
pub struct CommonAncestorResolver<'a> {
    program: &'a Program,
    fallback: &'a dyn TypeInfoSource,
}

impl std::fmt::Debug for CommonAncestorResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommonAncestorResolver")
            .field("program_types", &self.program.len())
            .finish_non_exhaustive()
    }
}

impl<'a> CommonAncestorResolver<'a> {
    pub fn new(program: &'a Program, fallback: &'a dyn TypeInfoSource) -> Self {
        Self { program, fallback }
    }

    /// A resolver whose fallback is the built-in platform table.
    pub fn with_platform(program: &'a Program) -> Self {
        Self::new(program, &PlatformTypes)
    }

    fn edges(&self, name: &str) -> Option<TypeEdges> {
        self.program
            .edges(name)
            .or_else(|| self.fallback.edges(name))
    }

    fn super_of(&self, name: &str) -> Option<String> {
        self.edges(name).and_then(|e| e.super_name)
    }

    /// Whether either source describes the type.
    pub fn knows(&self, name: &str) -> bool {
        self.edges(name).is_some()
    }

    pub fn is_interface(&self, name: &str) -> bool {
        self.edges(name).is_some_and(|e| e.is_interface)
    }

    /// Whether a value of type `sub` can be stored where `sup` is expected:
    /// equality, the universal root, or reachable through super/interface edges.
    pub fn is_assignable(&self, sup: &str, sub: &str) -> bool {
        if sup == sub || sup == OBJECT {
            return true;
        }
        let mut seen: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<String> = VecDeque::from([sub.to_string()]);
        while let Some(current) = frontier.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(edges) = self.edges(&current) else {
                continue;
            };
            for next in edges.super_name.into_iter().chain(edges.interfaces) {
                if next == sup {
                    return true;
                }
                frontier.push_back(next);
            }
        }
        false
    }

    /// The most specific type both `a` and `b` are assignable to, degrading to
    /// the universal root whenever the hierarchy is unknown or involves interfaces.
    pub fn resolve(&self, a: &str, b: &str) -> String {
        if a == b {
            return a.to_string();
        }
        if a == OBJECT || b == OBJECT {
            return OBJECT.to_string();
        }
        if self.is_assignable(a, b) {
            return a.to_string();
        }
        if self.is_assignable(b, a) {
            return b.to_string();
        }
        if self.is_interface(a) || self.is_interface(b) {
            return OBJECT.to_string();
        }

        let mut seen: HashSet<String> = HashSet::from([a.to_string()]);
        let mut current = self.super_of(a);
        while let Some(ty) = current {
            if ty == OBJECT || !seen.insert(ty.clone()) {
                break;
            }
            if self.is_assignable(&ty, b) {
                return ty;
            }
            current = self.super_of(&ty);
        }
        OBJECT.to_string()
    }
}
