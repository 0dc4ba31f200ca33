//! A crate for building and serializing Java class files. A caller assembles a
//! class from field and method declarations plus the abstract instruction
//! stream of each method body; emission resolves the constant pool, assigns
//! bytecode offsets, picks compact opcode encodings, allocates local variable
//! registers from liveness information and produces the stack map frames
//! required by modern verifiers. The same structures parse an existing class
//! file back for inspection or extension.
//!
//! Supported class file versions range from 45.3 ("1.0") through 50.0 ("1.6").

// Ensure each result error is either unwrapped or returned
#![deny(unused_must_use)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod class;
pub mod code;
pub mod descriptor;
pub mod error;
pub mod instruction;
pub mod rw;

pub use crate::class::class_file::{AccessFlags, ClassFile, FieldConstant, FieldInfo, MethodInfo};
pub use crate::class::version::ClassVersion;
pub use crate::code::CodeBuilder;
pub use crate::descriptor::{MethodDesc, TypeDesc};
pub use crate::error::{Error, Result};
