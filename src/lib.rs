//! # dexgen
//!
//! The Dalvik side of a .NET to Android compiler: an in-memory dex object
//! model, a type classification oracle over CLR, JVM and intermediate type
//! systems, a Dalvik instruction selector and a dex file reader/writer.
//!
//! ```
//! use dexgen::classify::{ClrClassifier, ClrType};
//! use dexgen::opcodes::RCode;
//! use dexgen::select::InstructionSelector;
//!
//! let selector = InstructionSelector::new(ClrClassifier);
//! let int_array = ClrType::array(ClrType::Int32);
//! assert_eq!(selector.aput(&int_array).unwrap(), RCode::Aput);
//! ```

#[macro_use]
pub mod dex;
pub mod class_def;
pub mod classify;
pub mod code;
pub mod container;
pub mod freeze;
pub mod lookup;
pub mod members;
pub mod opcodes;
pub mod select;
pub mod types;

#[cfg(test)]
mod tests;

pub use class_def::ClassDefinition;
pub use container::{ClassArena, ClassId, Dex, DexId};
pub use dex::error::{DexError, ErrorKind};
pub use dex::{DexOptions, DexReader, DexVersion, DexWriter};
pub use lookup::{hierarchicalize, DexLookup, Hierarchy, HierarchyDiagnostic};
pub use members::{
    AccessFlags, Annotation, AnnotationVisibility, FieldDefinition, FieldReference, MethodDefinition, MethodReference,
    Parameter, Prototype, Value,
};
pub use types::{ClassReference, PrimitiveType, TypeReference};
