//! The constant pool: a deduplicated, 1-indexed table of tagged constants.
//! Long and double entries occupy two slots for indexing purposes; index 0 is
//! reserved to mean "no constant".

use std::io::{self, Error as IoError, ErrorKind, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use hashbrown::HashMap;

use crate::descriptor::TypeDesc;
use crate::error::{Error, Result};
use crate::rw::{Readable, Writeable};

#[derive(Debug, Clone)]
pub enum Constant {
    Utf8(ConstantUtf8),
    Int(ConstantInteger),
    Float(ConstantFloat),
    Long(ConstantLong),
    Double(ConstantDouble),
    Class(ConstantClass),
    String(ConstantString),
    FieldRef(ConstantFieldRef),
    MethodRef(ConstantMethodRef),
    InterfaceMethodRef(ConstantInterfaceMethodRef),
    NameAndType(ConstantNameAndType),

    // Due to a poor choice in the JVM specification, 8 byte constants must
    // take up 2 slots for indexing.
    Placeholder,
}

impl Constant {
    fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => ConstantUtf8::TAG,
            Constant::Int(_) => ConstantInteger::TAG,
            Constant::Float(_) => ConstantFloat::TAG,
            Constant::Long(_) => ConstantLong::TAG,
            Constant::Double(_) => ConstantDouble::TAG,
            Constant::Class(_) => ConstantClass::TAG,
            Constant::String(_) => ConstantString::TAG,
            Constant::FieldRef(_) => ConstantFieldRef::TAG,
            Constant::MethodRef(_) => ConstantMethodRef::TAG,
            Constant::InterfaceMethodRef(_) => ConstantInterfaceMethodRef::TAG,
            Constant::NameAndType(_) => ConstantNameAndType::TAG,
            Constant::Placeholder => 0,
        }
    }

    /// Number of pool slots this entry occupies.
    pub fn width(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    pub fn expect_utf8(&self) -> Option<&str> {
        match self {
            Constant::Utf8(ConstantUtf8 { text }) => Some(text),
            _ => None,
        }
    }

    pub fn expect_class(&self) -> Option<u16> {
        match self {
            Constant::Class(ConstantClass { name_index }) => Some(*name_index),
            _ => None,
        }
    }

    pub fn expect_name_and_type(&self) -> Option<ConstantNameAndType> {
        match self {
            Constant::NameAndType(x) => Some(*x),
            _ => None,
        }
    }

    fn dedup_key(&self) -> Option<PoolKey> {
        Some(match self {
            Constant::Utf8(v) => PoolKey::Utf8(v.text.clone()),
            Constant::Int(v) => PoolKey::Int(v.value),
            Constant::Float(v) => PoolKey::Float(v.value.to_bits()),
            Constant::Long(v) => PoolKey::Long(v.value),
            Constant::Double(v) => PoolKey::Double(v.value.to_bits()),
            Constant::Class(v) => PoolKey::Class(v.name_index),
            Constant::String(v) => PoolKey::String(v.string_index),
            Constant::FieldRef(v) => PoolKey::FieldRef(v.class_index, v.name_and_type_index),
            Constant::MethodRef(v) => PoolKey::MethodRef(v.class_index, v.name_and_type_index),
            Constant::InterfaceMethodRef(v) => {
                PoolKey::InterfaceMethodRef(v.class_index, v.name_and_type_index)
            }
            Constant::NameAndType(v) => PoolKey::NameAndType(v.name_index, v.descriptor_index),
            Constant::Placeholder => return None,
        })
    }
}

impl Readable for Constant {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        Ok(match buffer.read_u8()? {
            ConstantUtf8::TAG => Constant::Utf8(ConstantUtf8::read(buffer)?),
            ConstantInteger::TAG => Constant::Int(ConstantInteger::read(buffer)?),
            ConstantFloat::TAG => Constant::Float(ConstantFloat::read(buffer)?),
            ConstantLong::TAG => Constant::Long(ConstantLong::read(buffer)?),
            ConstantDouble::TAG => Constant::Double(ConstantDouble::read(buffer)?),
            ConstantClass::TAG => Constant::Class(ConstantClass::read(buffer)?),
            ConstantString::TAG => Constant::String(ConstantString::read(buffer)?),
            ConstantFieldRef::TAG => Constant::FieldRef(ConstantFieldRef::read(buffer)?),
            ConstantMethodRef::TAG => Constant::MethodRef(ConstantMethodRef::read(buffer)?),
            ConstantInterfaceMethodRef::TAG => {
                Constant::InterfaceMethodRef(ConstantInterfaceMethodRef::read(buffer)?)
            }
            ConstantNameAndType::TAG => Constant::NameAndType(ConstantNameAndType::read(buffer)?),
            x => {
                return Err(IoError::new(
                    ErrorKind::InvalidData,
                    format!("unknown constant pool tag {}", x),
                ))
            }
        })
    }
}

impl Writeable for Constant {
    fn write<T: Write>(&self, buffer: &mut T) -> io::Result<()> {
        match self {
            Constant::Placeholder => return Ok(()),
            _ => buffer.write_u8(self.tag())?,
        }

        match self {
            Constant::Utf8(v) => v.write(buffer),
            Constant::Int(v) => v.write(buffer),
            Constant::Float(v) => v.write(buffer),
            Constant::Long(v) => v.write(buffer),
            Constant::Double(v) => v.write(buffer),
            Constant::Class(v) => v.write(buffer),
            Constant::String(v) => v.write(buffer),
            Constant::FieldRef(v) => v.write(buffer),
            Constant::MethodRef(v) => v.write(buffer),
            Constant::InterfaceMethodRef(v) => v.write(buffer),
            Constant::NameAndType(v) => v.write(buffer),
            Constant::Placeholder => Ok(()),
        }
    }
}

/// Structural identity of a pool entry. Floating point entries key on their
/// bit patterns so NaN payloads deduplicate like any other value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Int(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    NameAndType(u16, u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
}

#[derive(Debug, Clone)]
pub struct ConstantUtf8 {
    pub text: String,
}

impl ConstantUtf8 {
    pub const TAG: u8 = 1;
}

impl Readable for ConstantUtf8 {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        let len = buffer.read_u16::<BigEndian>()?;

        let mut bytes = vec![0u8; len as usize];
        buffer.read_exact(&mut bytes)?;

        // The class file format stores strings in "modified" (Java flavored)
        // cesu8, not standard utf8.
        let text = match cesu8::from_java_cesu8(&bytes) {
            Ok(v) => v.into_owned(),
            Err(e) => return Err(IoError::new(ErrorKind::InvalidData, e)),
        };

        Ok(ConstantUtf8 { text })
    }
}

impl Writeable for ConstantUtf8 {
    fn write<T: Write>(&self, buffer: &mut T) -> io::Result<()> {
        let encoded = cesu8::to_java_cesu8(&self.text);
        if encoded.len() > u16::MAX as usize {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                "utf8 constant exceeds 65535 bytes",
            ));
        }

        buffer.write_u16::<BigEndian>(encoded.len() as u16)?;
        buffer.write_all(&encoded)
    }
}

macro_rules! constant_struct {
    ($(#[$($macros:tt)+])* $name:ident, $tag:literal { $($field:ident: $type:ty),+ $(,)? }) => {
        $(#[$($macros)+])*
        #[derive(Debug, Copy, Clone)]
        pub struct $name {
            $(pub $field: $type),+
        }

        impl $name {
            pub const TAG: u8 = $tag;
        }

        impl Readable for $name {
            fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
                Ok($name { $($field: <$type>::read(buffer)?),+ })
            }
        }

        impl Writeable for $name {
            fn write<T: Write>(&self, buffer: &mut T) -> io::Result<()> {
                $(self.$field.write(buffer)?;)+
                Ok(())
            }
        }
    };
}

constant_struct! { ConstantInteger, 3 { value: i32 } }
constant_struct! { ConstantFloat, 4 { value: f32 } }
constant_struct! { ConstantLong, 5 { value: i64 } }
constant_struct! { ConstantDouble, 6 { value: f64 } }
constant_struct! { ConstantClass, 7 { name_index: u16 } }
constant_struct! { ConstantString, 8 { string_index: u16 } }
constant_struct! { ConstantFieldRef, 9 { class_index: u16, name_and_type_index: u16 } }
constant_struct! { ConstantMethodRef, 10 { class_index: u16, name_and_type_index: u16 } }
constant_struct! { ConstantInterfaceMethodRef, 11 { class_index: u16, name_and_type_index: u16 } }
constant_struct! {
    /// Both fields are indexes to CONSTANT_Utf8 entries in the same table.
    ConstantNameAndType, 12 { name_index: u16, descriptor_index: u16 }
}

/// An owning, append-only constant pool. Every `add_*` deduplicates by
/// structural equality and returns the index of the existing entry when one
/// matches; reference entries canonicalize transitively because the indices
/// they contain were themselves deduplicated.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<PoolKey, u16>,
}

// The written entry count is slots + 1, and must fit in a u16.
const MAX_POOL_SLOTS: usize = 65534;

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool::default()
    }

    /// Number of occupied slots. The count serialized to the file is one
    /// greater, per the class file specification.
    pub fn slots(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        if index == 0 {
            return None;
        }

        match self.entries.get(index as usize - 1) {
            Some(Constant::Placeholder) | None => None,
            Some(entry) => Some(entry),
        }
    }

    pub fn text(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(Constant::Utf8(ConstantUtf8 { text })) => Ok(text),
            Some(x) => Err(Error::malformed(format!(
                "expected Utf8 constant at {}, but found {:?}",
                index, x
            ))),
            None => Err(Error::Unresolved(format!("constant pool index {}", index))),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(Constant::Class(ConstantClass { name_index })) => self.text(*name_index),
            Some(x) => Err(Error::malformed(format!(
                "expected Class constant at {}, but found {:?}",
                index, x
            ))),
            None => Err(Error::Unresolved(format!("constant pool index {}", index))),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index) {
            Some(Constant::NameAndType(v)) => {
                Ok((self.text(v.name_index)?, self.text(v.descriptor_index)?))
            }
            Some(x) => Err(Error::malformed(format!(
                "expected NameAndType constant at {}, but found {:?}",
                index, x
            ))),
            None => Err(Error::Unresolved(format!("constant pool index {}", index))),
        }
    }

    /// Resolve a field/method/interface-method reference down to
    /// (class name, member name, member descriptor).
    pub fn member_ref(&self, index: u16) -> Result<(&str, &str, &str)> {
        let (class_index, name_and_type_index) = match self.get(index) {
            Some(Constant::FieldRef(v)) => (v.class_index, v.name_and_type_index),
            Some(Constant::MethodRef(v)) => (v.class_index, v.name_and_type_index),
            Some(Constant::InterfaceMethodRef(v)) => (v.class_index, v.name_and_type_index),
            Some(x) => {
                return Err(Error::malformed(format!(
                    "expected member reference at {}, but found {:?}",
                    index, x
                )))
            }
            None => return Err(Error::Unresolved(format!("constant pool index {}", index))),
        };

        let (name, desc) = self.name_and_type(name_and_type_index)?;
        Ok((self.class_name(class_index)?, name, desc))
    }

    fn insert(&mut self, key: PoolKey, entry: Constant) -> Result<u16> {
        if let Some(&index) = self.lookup.get(&key) {
            return Ok(index);
        }

        let width = entry.width() as usize;
        if self.entries.len() + width > MAX_POOL_SLOTS {
            return Err(Error::PoolOverflow(format!(
                "constant pool cannot hold more than {} slots",
                MAX_POOL_SLOTS
            )));
        }

        let index = self.entries.len() as u16 + 1;
        self.entries.push(entry);
        if width == 2 {
            self.entries.push(Constant::Placeholder);
        }

        self.lookup.insert(key, index);
        Ok(index)
    }

    pub fn add_utf8(&mut self, text: &str) -> Result<u16> {
        self.insert(
            PoolKey::Utf8(text.to_string()),
            Constant::Utf8(ConstantUtf8 {
                text: text.to_string(),
            }),
        )
    }

    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.insert(
            PoolKey::Int(value),
            Constant::Int(ConstantInteger { value }),
        )
    }

    pub fn add_float(&mut self, value: f32) -> Result<u16> {
        self.insert(
            PoolKey::Float(value.to_bits()),
            Constant::Float(ConstantFloat { value }),
        )
    }

    pub fn add_long(&mut self, value: i64) -> Result<u16> {
        self.insert(PoolKey::Long(value), Constant::Long(ConstantLong { value }))
    }

    pub fn add_double(&mut self, value: f64) -> Result<u16> {
        self.insert(
            PoolKey::Double(value.to_bits()),
            Constant::Double(ConstantDouble { value }),
        )
    }

    /// Intern a class entry for a reference type. Primitive types have no
    /// class constant form.
    pub fn add_class(&mut self, ty: &TypeDesc) -> Result<u16> {
        let name = ty.class_internal_name().ok_or_else(|| {
            Error::Illegal(format!("no class constant for primitive type {}", ty))
        })?;
        // Split the borrow before mutating.
        let name = name.to_string();
        self.add_class_name(&name)
    }

    /// Intern a class entry from an internal-form name such as
    /// `java/lang/String` or `[I`.
    pub fn add_class_name(&mut self, internal_name: &str) -> Result<u16> {
        let name_index = self.add_utf8(internal_name)?;
        self.insert(
            PoolKey::Class(name_index),
            Constant::Class(ConstantClass { name_index }),
        )
    }

    pub fn add_string(&mut self, text: &str) -> Result<u16> {
        let string_index = self.add_utf8(text)?;
        self.insert(
            PoolKey::String(string_index),
            Constant::String(ConstantString { string_index }),
        )
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.insert(
            PoolKey::NameAndType(name_index, descriptor_index),
            Constant::NameAndType(ConstantNameAndType {
                name_index,
                descriptor_index,
            }),
        )
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class_name(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.insert(
            PoolKey::FieldRef(class_index, name_and_type_index),
            Constant::FieldRef(ConstantFieldRef {
                class_index,
                name_and_type_index,
            }),
        )
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class_name(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.insert(
            PoolKey::MethodRef(class_index, name_and_type_index),
            Constant::MethodRef(ConstantMethodRef {
                class_index,
                name_and_type_index,
            }),
        )
    }

    pub fn add_interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class_index = self.add_class_name(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.insert(
            PoolKey::InterfaceMethodRef(class_index, name_and_type_index),
            Constant::InterfaceMethodRef(ConstantInterfaceMethodRef {
                class_index,
                name_and_type_index,
            }),
        )
    }

    /// Look up the index of an existing utf8 entry without inserting.
    pub fn find_utf8(&self, text: &str) -> Option<u16> {
        self.lookup.get(&PoolKey::Utf8(text.to_string())).copied()
    }
}

impl Readable for ConstantPool {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        let count = buffer.read_u16::<BigEndian>()?;
        let mut entries = Vec::with_capacity(count as usize);

        let mut index = 1;
        while index < count {
            let entry = Constant::read(buffer)?;
            trace!("\t{}/{}: {:?}", index, count, &entry);

            index += entry.width();
            match entry.width() {
                2 => {
                    entries.push(entry);
                    entries.push(Constant::Placeholder);
                }
                _ => entries.push(entry),
            }
        }

        // Rebuild the dedup table so a parsed pool can be extended in place.
        let mut lookup = HashMap::new();
        for (position, entry) in entries.iter().enumerate() {
            if let Some(key) = entry.dedup_key() {
                lookup.entry(key).or_insert(position as u16 + 1);
            }
        }

        Ok(ConstantPool { entries, lookup })
    }
}

impl Writeable for ConstantPool {
    fn write<T: Write>(&self, buffer: &mut T) -> io::Result<()> {
        buffer.write_u16::<BigEndian>(self.entries.len() as u16 + 1)?;

        for entry in &self.entries {
            entry.write(buffer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_returns_same_index() {
        let mut pool = ConstantPool::new();
        let a = pool.add_utf8("Hello").unwrap();
        let b = pool.add_utf8("Hello").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.slots(), 1);
    }

    #[test]
    fn long_takes_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.add_long(42).unwrap();
        let after = pool.add_integer(7).unwrap();
        assert_eq!(long, 1);
        assert_eq!(after, 3);
        assert!(pool.get(2).is_none());
    }

    #[test]
    fn nan_floats_dedup() {
        let mut pool = ConstantPool::new();
        let a = pool.add_float(f32::NAN).unwrap();
        let b = pool.add_float(f32::NAN).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn refs_canonicalize_transitively() {
        let mut pool = ConstantPool::new();
        let a = pool
            .add_method_ref("java/io/PrintStream", "println", "(Ljava/lang/String;)V")
            .unwrap();
        let b = pool
            .add_method_ref("java/io/PrintStream", "println", "(Ljava/lang/String;)V")
            .unwrap();
        assert_eq!(a, b);

        let (class, name, desc) = pool.member_ref(a).unwrap();
        assert_eq!(class, "java/io/PrintStream");
        assert_eq!(name, "println");
        assert_eq!(desc, "(Ljava/lang/String;)V");
    }

    #[test]
    fn round_trip_preserves_indices() {
        let mut pool = ConstantPool::new();
        pool.add_utf8("first").unwrap();
        pool.add_double(3.25).unwrap();
        let class = pool.add_class_name("java/lang/Object").unwrap();

        let bytes = pool.to_vec().unwrap();
        let reread = ConstantPool::from_slice(&bytes).unwrap();
        assert_eq!(reread.slots(), pool.slots());
        assert_eq!(reread.class_name(class).unwrap(), "java/lang/Object");
        assert_eq!(reread.to_vec().unwrap(), bytes);
    }

    #[test]
    fn parsed_pool_extends_with_dedup() {
        let mut pool = ConstantPool::new();
        let original = pool.add_utf8("shared").unwrap();

        let bytes = pool.to_vec().unwrap();
        let mut reread = ConstantPool::from_slice(&bytes).unwrap();
        assert_eq!(reread.add_utf8("shared").unwrap(), original);
    }
}
