pub mod attribute;
pub mod class_file;
pub mod constant;
pub mod loader;
pub mod version;

pub use class_file::{AccessFlags, ClassFile, FieldInfo, MethodInfo};
pub use constant::{Constant, ConstantPool};
pub use version::ClassVersion;
