//! The attribute model. Known attributes are structured variants; anything
//! unrecognized round-trips as opaque bytes. A caller supplied
//! [AttributeFactory] gets the first look at names the crate does not know.

use std::io::{self, Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::class::class_file::AccessFlags;
use crate::class::constant::ConstantPool;
use crate::error::{Error, Result};
use crate::rw::{Readable, Writeable};

#[derive(Debug, Clone)]
pub enum Attribute {
    Code(CodeAttribute),
    Exceptions(Exceptions),
    InnerClasses(InnerClasses),
    LineNumberTable(LineNumberTable),
    LocalVariableTable(LocalVariableTable),
    StackMapTable(StackMapTable),
    SourceFile(SourceFile),
    Signature(Signature),
    EnclosingMethod(EnclosingMethod),
    ConstantValue(ConstantValue),
    Synthetic,
    Deprecated,
    Opaque(OpaqueAttribute),
}

/// Called for attribute names the crate does not recognize. Returning
/// `Ok(None)` falls back to an opaque attribute.
pub trait AttributeFactory {
    fn create(&self, name: &str, data: &[u8], pool: &ConstantPool) -> Result<Option<Attribute>>;
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Code(_) => "Code",
            Attribute::Exceptions(_) => "Exceptions",
            Attribute::InnerClasses(_) => "InnerClasses",
            Attribute::LineNumberTable(_) => "LineNumberTable",
            Attribute::LocalVariableTable(_) => "LocalVariableTable",
            Attribute::StackMapTable(_) => "StackMapTable",
            Attribute::SourceFile(_) => "SourceFile",
            Attribute::Signature(_) => "Signature",
            Attribute::EnclosingMethod(_) => "EnclosingMethod",
            Attribute::ConstantValue(_) => "ConstantValue",
            Attribute::Synthetic => "Synthetic",
            Attribute::Deprecated => "Deprecated",
            Attribute::Opaque(v) => &v.name,
        }
    }

    /// Intern everything this attribute needs before the pool is serialized.
    pub fn register(&self, pool: &mut ConstantPool) -> Result<()> {
        pool.add_utf8(self.name())?;

        if let Attribute::Code(code) = self {
            for nested in &code.attributes {
                nested.register(pool)?;
            }
        }

        Ok(())
    }

    fn payload(&self, pool: &ConstantPool) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        match self {
            Attribute::Code(v) => v.write_payload(pool, &mut out)?,
            Attribute::Exceptions(v) => v.write(&mut out)?,
            Attribute::InnerClasses(v) => v.write(&mut out)?,
            Attribute::LineNumberTable(v) => v.write(&mut out)?,
            Attribute::LocalVariableTable(v) => v.write(&mut out)?,
            Attribute::StackMapTable(v) => v.write(&mut out)?,
            Attribute::SourceFile(v) => v.write(&mut out)?,
            Attribute::Signature(v) => v.write(&mut out)?,
            Attribute::EnclosingMethod(v) => v.write(&mut out)?,
            Attribute::ConstantValue(v) => v.write(&mut out)?,
            Attribute::Synthetic | Attribute::Deprecated => {}
            Attribute::Opaque(v) => out.extend_from_slice(&v.data),
        }

        Ok(out)
    }

    pub fn write_to<T: Write>(&self, pool: &ConstantPool, buffer: &mut T) -> Result<()> {
        let name_index = pool
            .find_utf8(self.name())
            .ok_or_else(|| Error::Unresolved(format!("attribute name {:?}", self.name())))?;

        let payload = self.payload(pool)?;
        buffer.write_u16::<BigEndian>(name_index)?;
        buffer.write_u32::<BigEndian>(payload.len() as u32)?;
        buffer.write_all(&payload)?;
        Ok(())
    }

    pub fn read_from<T: Read>(
        buffer: &mut T,
        pool: &ConstantPool,
        factory: Option<&dyn AttributeFactory>,
    ) -> Result<Attribute> {
        let name_index = buffer.read_u16::<BigEndian>()?;
        let length = buffer.read_u32::<BigEndian>()?;

        let mut data = vec![0u8; length as usize];
        buffer.read_exact(&mut data)?;

        let name = pool.text(name_index)?;
        let mut payload = Cursor::new(&data[..]);

        Ok(match name {
            "Code" => Attribute::Code(CodeAttribute::read_payload(&mut payload, pool, factory)?),
            "Exceptions" => Attribute::Exceptions(Exceptions::read(&mut payload)?),
            "InnerClasses" => Attribute::InnerClasses(InnerClasses::read(&mut payload)?),
            "LineNumberTable" => Attribute::LineNumberTable(LineNumberTable::read(&mut payload)?),
            "LocalVariableTable" => {
                Attribute::LocalVariableTable(LocalVariableTable::read(&mut payload)?)
            }
            "StackMapTable" => Attribute::StackMapTable(StackMapTable::read(&mut payload)?),
            "SourceFile" => Attribute::SourceFile(SourceFile::read(&mut payload)?),
            "Signature" => Attribute::Signature(Signature::read(&mut payload)?),
            "EnclosingMethod" => Attribute::EnclosingMethod(EnclosingMethod::read(&mut payload)?),
            "ConstantValue" => Attribute::ConstantValue(ConstantValue::read(&mut payload)?),
            "Synthetic" => Attribute::Synthetic,
            "Deprecated" => Attribute::Deprecated,
            other => {
                if let Some(factory) = factory {
                    if let Some(recognized) = factory.create(other, &data, pool)? {
                        return Ok(recognized);
                    }
                }

                Attribute::Opaque(OpaqueAttribute {
                    name: other.to_string(),
                    data,
                })
            }
        })
    }
}

pub fn write_attributes<T: Write>(
    attributes: &[Attribute],
    pool: &ConstantPool,
    buffer: &mut T,
) -> Result<()> {
    if attributes.len() > u16::MAX as usize {
        return Err(Error::PoolOverflow("attribute count".to_string()));
    }

    buffer.write_u16::<BigEndian>(attributes.len() as u16)?;
    for attribute in attributes {
        attribute.write_to(pool, buffer)?;
    }

    Ok(())
}

pub fn read_attributes<T: Read>(
    buffer: &mut T,
    pool: &ConstantPool,
    factory: Option<&dyn AttributeFactory>,
) -> Result<Vec<Attribute>> {
    let count = buffer.read_u16::<BigEndian>()?;
    let mut attributes = Vec::with_capacity(count as usize);

    for _ in 0..count {
        attributes.push(Attribute::read_from(buffer, pool, factory)?);
    }

    Ok(attributes)
}

#[derive(Debug, Clone)]
pub struct OpaqueAttribute {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionRange>,
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    fn write_payload<T: Write>(&self, pool: &ConstantPool, buffer: &mut T) -> Result<()> {
        buffer.write_u16::<BigEndian>(self.max_stack)?;
        buffer.write_u16::<BigEndian>(self.max_locals)?;
        buffer.write_u32::<BigEndian>(self.code.len() as u32)?;
        buffer.write_all(&self.code)?;
        self.exception_table.write(buffer)?;
        write_attributes(&self.attributes, pool, buffer)
    }

    fn read_payload<T: Read>(
        buffer: &mut T,
        pool: &ConstantPool,
        factory: Option<&dyn AttributeFactory>,
    ) -> Result<CodeAttribute> {
        let max_stack = buffer.read_u16::<BigEndian>()?;
        let max_locals = buffer.read_u16::<BigEndian>()?;

        let code_length = buffer.read_u32::<BigEndian>()?;
        let mut code = vec![0u8; code_length as usize];
        buffer.read_exact(&mut code)?;

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table: <Vec<ExceptionRange>>::read(buffer)?,
            attributes: read_attributes(buffer, pool, factory)?,
        })
    }
}

macro_rules! attribute_struct {
    ($(#[$($macros:tt)+])* $name:ident { $($field:ident: $type:ty),+ $(,)? }) => {
        $(#[$($macros)+])*
        #[derive(Debug, Clone)]
        pub struct $name {
            $(pub $field: $type),+
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

attribute_struct! {
    /// One row of the exception table. `start_pc` is inclusive, `end_pc`
    /// exclusive; `catch_type` 0 marks a finally handler.
    ExceptionRange {
        start_pc: u16,
        end_pc: u16,
        handler_pc: u16,
        catch_type: u16,
    }
}

impl Copy for ExceptionRange {}

attribute_struct! { LineNumber { start_pc: u16, line_number: u16 } }
attribute_struct! { LineNumberTable { entries: Vec<LineNumber> } }

attribute_struct! {
    LocalVariableEntry {
        start_pc: u16,
        length: u16,
        name_index: u16,
        descriptor_index: u16,
        index: u16,
    }
}

attribute_struct! { LocalVariableTable { entries: Vec<LocalVariableEntry> } }

attribute_struct! {
    InnerClass {
        inner_class_info: u16,
        outer_class_info: u16,
        inner_name_index: u16,
        inner_class_access_flags: AccessFlags,
    }
}

attribute_struct! { InnerClasses { classes: Vec<InnerClass> } }
attribute_struct! { SourceFile { index: u16 } }
attribute_struct! { Signature { index: u16 } }
attribute_struct! { EnclosingMethod { class_index: u16, method_index: u16 } }
attribute_struct! { ConstantValue { index: u16 } }
attribute_struct! { Exceptions { class_indices: Vec<u16> } }
attribute_struct! { StackMapTable { frames: Vec<StackMapFrame> } }

/// A stack map frame in its serialized shape. The encoding chosen for a
/// frame is preserved so re-emission of a parsed table is byte exact.
#[derive(Debug, Clone)]
pub enum StackMapFrame {
    /// Tags 0-63: same locals as the previous frame, empty stack, the tag is
    /// the offset delta.
    SameFrame(u8),
    /// Tags 64-127: same locals, one stack entry, delta is `tag - 64`.
    SameLocals1StackItemFrame {
        frame_type: u8,
        stack: VerificationTypeInfo,
    },
    /// Tag 247: same locals, one stack entry, explicit delta.
    SameLocals1StackItemFrameExtended {
        offset_delta: u16,
        stack: VerificationTypeInfo,
    },
    /// Tags 248-250: the last `251 - tag` locals are absent, empty stack.
    ChopFrame { frame_type: u8, offset_delta: u16 },
    /// Tag 251: same locals, empty stack, explicit delta.
    SameFrameExtended { offset_delta: u16 },
    /// Tags 252-254: `tag - 251` additional locals, empty stack.
    AppendFrame {
        frame_type: u8,
        offset_delta: u16,
        locals: Vec<VerificationTypeInfo>,
    },
    /// Tag 255.
    FullFrame {
        offset_delta: u16,
        locals: Vec<VerificationTypeInfo>,
        stack: Vec<VerificationTypeInfo>,
    },
}

impl Readable for StackMapFrame {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        let frame_type = u8::read(buffer)?;

        Ok(match frame_type {
            0..=63 => StackMapFrame::SameFrame(frame_type),
            64..=127 => StackMapFrame::SameLocals1StackItemFrame {
                frame_type,
                stack: VerificationTypeInfo::read(buffer)?,
            },
            128..=246 => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("stack_map_frame tag {} is reserved", frame_type),
                ))
            }
            247 => StackMapFrame::SameLocals1StackItemFrameExtended {
                offset_delta: u16::read(buffer)?,
                stack: VerificationTypeInfo::read(buffer)?,
            },
            248..=250 => StackMapFrame::ChopFrame {
                frame_type,
                offset_delta: u16::read(buffer)?,
            },
            251 => StackMapFrame::SameFrameExtended {
                offset_delta: u16::read(buffer)?,
            },
            252..=254 => StackMapFrame::AppendFrame {
                frame_type,
                offset_delta: u16::read(buffer)?,
                locals: {
                    let count = frame_type - 251;
                    let mut locals = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        locals.push(VerificationTypeInfo::read(buffer)?);
                    }
                    locals
                },
            },
            255 => StackMapFrame::FullFrame {
                offset_delta: u16::read(buffer)?,
                locals: <Vec<VerificationTypeInfo>>::read(buffer)?,
                stack: <Vec<VerificationTypeInfo>>::read(buffer)?,
            },
        })
    }
}

impl Writeable for StackMapFrame {
    fn write<T: Write>(&self, buffer: &mut T) -> io::Result<()> {
        match self {
            StackMapFrame::SameFrame(frame_type) => frame_type.write(buffer),
            StackMapFrame::SameLocals1StackItemFrame { frame_type, stack } => {
                frame_type.write(buffer)?;
                stack.write(buffer)
            }
            StackMapFrame::SameLocals1StackItemFrameExtended {
                offset_delta,
                stack,
            } => {
                247u8.write(buffer)?;
                offset_delta.write(buffer)?;
                stack.write(buffer)
            }
            StackMapFrame::ChopFrame {
                frame_type,
                offset_delta,
            } => {
                frame_type.write(buffer)?;
                offset_delta.write(buffer)
            }
            StackMapFrame::SameFrameExtended { offset_delta } => {
                251u8.write(buffer)?;
                offset_delta.write(buffer)
            }
            StackMapFrame::AppendFrame {
                frame_type,
                offset_delta,
                locals,
            } => {
                frame_type.write(buffer)?;
                offset_delta.write(buffer)?;
                for local in locals {
                    local.write(buffer)?;
                }
                Ok(())
            }
            StackMapFrame::FullFrame {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.write(buffer)?;
                offset_delta.write(buffer)?;
                locals.write(buffer)?;
                stack.write(buffer)
            }
        }
    }
}

/// A verification type in its serialized shape: a one byte tag plus, for
/// `Object` and `Uninitialized`, a two byte operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationTypeInfo {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object { class_index: u16 },
    Uninitialized { offset: u16 },
}

impl Readable for VerificationTypeInfo {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        Ok(match u8::read(buffer)? {
            0 => VerificationTypeInfo::Top,
            1 => VerificationTypeInfo::Integer,
            2 => VerificationTypeInfo::Float,
            3 => VerificationTypeInfo::Double,
            4 => VerificationTypeInfo::Long,
            5 => VerificationTypeInfo::Null,
            6 => VerificationTypeInfo::UninitializedThis,
            7 => VerificationTypeInfo::Object {
                class_index: u16::read(buffer)?,
            },
            8 => VerificationTypeInfo::Uninitialized {
                offset: u16::read(buffer)?,
            },
            x => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} is not a valid verification_type_info tag", x),
                ))
            }
        })
    }
}

impl Writeable for VerificationTypeInfo {
    fn write<T: Write>(&self, buffer: &mut T) -> io::Result<()> {
        match self {
            VerificationTypeInfo::Top => 0u8.write(buffer),
            VerificationTypeInfo::Integer => 1u8.write(buffer),
            VerificationTypeInfo::Float => 2u8.write(buffer),
            VerificationTypeInfo::Double => 3u8.write(buffer),
            VerificationTypeInfo::Long => 4u8.write(buffer),
            VerificationTypeInfo::Null => 5u8.write(buffer),
            VerificationTypeInfo::UninitializedThis => 6u8.write(buffer),
            VerificationTypeInfo::Object { class_index } => {
                7u8.write(buffer)?;
                class_index.write(buffer)
            }
            VerificationTypeInfo::Uninitialized { offset } => {
                8u8.write(buffer)?;
                offset.write(buffer)
            }
        }
    }
}

impl VerificationTypeInfo {
    /// Locals slots this entry accounts for in a frame.
    pub fn slot_width(&self) -> u16 {
        match self {
            VerificationTypeInfo::Long | VerificationTypeInfo::Double => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let frames = vec![
            StackMapFrame::SameFrame(12),
            StackMapFrame::SameLocals1StackItemFrame {
                frame_type: 64,
                stack: VerificationTypeInfo::Integer,
            },
            StackMapFrame::AppendFrame {
                frame_type: 253,
                offset_delta: 40,
                locals: vec![
                    VerificationTypeInfo::Long,
                    VerificationTypeInfo::Object { class_index: 7 },
                ],
            },
            StackMapFrame::FullFrame {
                offset_delta: 100,
                locals: vec![VerificationTypeInfo::Top],
                stack: vec![VerificationTypeInfo::Null],
            },
        ];

        let table = StackMapTable { frames };
        let bytes = table.to_vec().unwrap();
        let reread = StackMapTable::from_slice(&bytes).unwrap();
        assert_eq!(reread.to_vec().unwrap(), bytes);
    }

    #[test]
    fn opaque_attributes_round_trip() {
        let mut pool = ConstantPool::new();
        let attr = Attribute::Opaque(OpaqueAttribute {
            name: "CustomThing".to_string(),
            data: vec![1, 2, 3, 4],
        });
        attr.register(&mut pool).unwrap();

        let mut bytes = Vec::new();
        attr.write_to(&pool, &mut bytes).unwrap();

        let mut cursor = Cursor::new(&bytes[..]);
        let reread = Attribute::read_from(&mut cursor, &pool, None).unwrap();
        match &reread {
            Attribute::Opaque(opaque) => {
                assert_eq!(opaque.name, "CustomThing");
                assert_eq!(opaque.data, [1, 2, 3, 4]);
            }
            x => panic!("expected opaque attribute, found {:?}", x),
        }

        let mut rewritten = Vec::new();
        reread.write_to(&pool, &mut rewritten).unwrap();
        assert_eq!(rewritten, bytes);
    }
}
