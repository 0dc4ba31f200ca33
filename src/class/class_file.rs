//! The top level class file builder, emitter and parser.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::class::attribute::{
    read_attributes, write_attributes, Attribute, AttributeFactory, CodeAttribute, ConstantValue,
    EnclosingMethod, Exceptions, InnerClass, InnerClasses, Signature, SourceFile,
};
use crate::class::constant::{Constant, ConstantPool};
use crate::class::version::{check_magic_number, ClassVersion};
use crate::code::CodeBuilder;
use crate::descriptor::{MethodDesc, TypeDesc};
use crate::error::{Error, Result};
use crate::instruction::list::{InstructionList, MethodContext};
use crate::rw::{Readable, Writeable};

bitflags! {
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

impl Readable for AccessFlags {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        Ok(AccessFlags::from_bits_truncate(
            buffer.read_u16::<BigEndian>()?,
        ))
    }
}

impl Writeable for AccessFlags {
    fn write<T: Write>(&self, buffer: &mut T) -> io::Result<()> {
        buffer.write_u16::<BigEndian>(self.bits)
    }
}

/// The value behind a field's ConstantValue attribute.
#[derive(Debug, Clone)]
pub enum FieldConstant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

#[derive(Debug)]
pub struct FieldInfo {
    pub access: AccessFlags,
    name: String,
    ty: TypeDesc,
    constant_value: Option<FieldConstant>,
    signature: Option<String>,
    synthetic: bool,
    deprecated: bool,
    extra_attributes: Vec<Attribute>,
    lowered: Vec<Attribute>,
}

impl FieldInfo {
    fn new(access: AccessFlags, name: &str, ty: TypeDesc) -> FieldInfo {
        FieldInfo {
            access,
            name: name.to_string(),
            ty,
            constant_value: None,
            signature: None,
            synthetic: false,
            deprecated: false,
            extra_attributes: Vec::new(),
            lowered: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &TypeDesc {
        &self.ty
    }

    pub fn set_constant_value(&mut self, value: FieldConstant) {
        self.constant_value = Some(value);
    }

    pub fn set_signature(&mut self, signature: &str) {
        self.signature = Some(signature.to_string());
    }

    pub fn set_synthetic(&mut self) {
        self.synthetic = true;
    }

    pub fn set_deprecated(&mut self) {
        self.deprecated = true;
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.extra_attributes.push(attribute);
    }

    fn lower(&mut self, pool: &mut ConstantPool) -> Result<()> {
        pool.add_utf8(&self.name)?;
        pool.add_utf8(self.ty.descriptor())?;

        let mut attributes = Vec::new();

        if let Some(value) = &self.constant_value {
            let index = match value {
                FieldConstant::Int(v) => pool.add_integer(*v)?,
                FieldConstant::Long(v) => pool.add_long(*v)?,
                FieldConstant::Float(v) => pool.add_float(*v)?,
                FieldConstant::Double(v) => pool.add_double(*v)?,
                FieldConstant::Str(v) => pool.add_string(v)?,
            };
            attributes.push(Attribute::ConstantValue(ConstantValue { index }));
        }

        if self.synthetic {
            attributes.push(Attribute::Synthetic);
        }
        if self.deprecated {
            attributes.push(Attribute::Deprecated);
        }
        if let Some(signature) = &self.signature {
            attributes.push(Attribute::Signature(Signature {
                index: pool.add_utf8(signature)?,
            }));
        }
        attributes.extend(self.extra_attributes.iter().cloned());

        for attribute in &attributes {
            attribute.register(pool)?;
        }

        self.lowered = attributes;
        Ok(())
    }

    fn write_to<T: Write>(&self, pool: &ConstantPool, buffer: &mut T) -> Result<()> {
        self.access.write(buffer)?;
        write_member_name(pool, &self.name, buffer)?;
        write_member_name(pool, self.ty.descriptor(), buffer)?;
        write_attributes(&self.lowered, pool, buffer)
    }
}

#[derive(Debug)]
pub struct MethodInfo {
    pub access: AccessFlags,
    name: String,
    descriptor: MethodDesc,
    pub(crate) code: Option<InstructionList>,
    /// The concrete Code attribute, produced by assembly or by parsing.
    lowered_code: Option<CodeAttribute>,
    exceptions: Vec<String>,
    signature: Option<String>,
    synthetic: bool,
    deprecated: bool,
    extra_attributes: Vec<Attribute>,
    lowered: Vec<Attribute>,
}

impl MethodInfo {
    fn new(access: AccessFlags, name: &str, descriptor: MethodDesc) -> MethodInfo {
        MethodInfo {
            access,
            name: name.to_string(),
            descriptor,
            code: None,
            lowered_code: None,
            exceptions: Vec::new(),
            signature: None,
            synthetic: false,
            deprecated: false,
            extra_attributes: Vec::new(),
            lowered: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &MethodDesc {
        &self.descriptor
    }

    pub fn code_attribute(&self) -> Option<&CodeAttribute> {
        self.lowered_code.as_ref()
    }

    /// Declare a checked exception thrown by this method.
    pub fn add_exception(&mut self, class: &str) {
        self.exceptions.push(class.replace('.', "/"));
    }

    pub fn set_signature(&mut self, signature: &str) {
        self.signature = Some(signature.to_string());
    }

    pub fn set_synthetic(&mut self) {
        self.synthetic = true;
    }

    pub fn set_deprecated(&mut self) {
        self.deprecated = true;
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.extra_attributes.push(attribute);
    }

    fn lower(
        &mut self,
        pool: &mut ConstantPool,
        class_name: &str,
        version: ClassVersion,
        debug_info: bool,
    ) -> Result<()> {
        pool.add_utf8(&self.name)?;
        pool.add_utf8(self.descriptor.descriptor())?;

        if let Some(list) = &mut self.code {
            let ctx = MethodContext {
                class_name,
                descriptor: &self.descriptor,
                is_static: self.access.contains(AccessFlags::STATIC),
                is_constructor: self.name == "<init>",
                version,
                debug_info,
            };

            let assembled = list.assemble(pool, &ctx)?;
            trace!(
                "assembled {}{}: {} bytes, {} stack, {} locals",
                self.name,
                self.descriptor,
                assembled.code.len(),
                assembled.max_stack,
                assembled.max_locals
            );

            let mut nested = Vec::new();
            if let Some(table) = assembled.line_numbers {
                nested.push(Attribute::LineNumberTable(table));
            }
            if let Some(table) = assembled.local_variables {
                nested.push(Attribute::LocalVariableTable(table));
            }
            if let Some(table) = assembled.stack_map {
                nested.push(Attribute::StackMapTable(table));
            }

            self.lowered_code = Some(CodeAttribute {
                max_stack: assembled.max_stack,
                max_locals: assembled.max_locals,
                code: assembled.code,
                exception_table: assembled.exception_table,
                attributes: nested,
            });
        }

        let mut attributes = Vec::new();
        if let Some(code) = &self.lowered_code {
            attributes.push(Attribute::Code(code.clone()));
        }
        if !self.exceptions.is_empty() {
            let mut class_indices = Vec::with_capacity(self.exceptions.len());
            for class in &self.exceptions {
                class_indices.push(pool.add_class_name(class)?);
            }
            attributes.push(Attribute::Exceptions(Exceptions { class_indices }));
        }
        if self.synthetic {
            attributes.push(Attribute::Synthetic);
        }
        if self.deprecated {
            attributes.push(Attribute::Deprecated);
        }
        if let Some(signature) = &self.signature {
            attributes.push(Attribute::Signature(Signature {
                index: pool.add_utf8(signature)?,
            }));
        }
        attributes.extend(self.extra_attributes.iter().cloned());

        for attribute in &attributes {
            attribute.register(pool)?;
        }

        self.lowered = attributes;
        Ok(())
    }

    fn write_to<T: Write>(&self, pool: &ConstantPool, buffer: &mut T) -> Result<()> {
        self.access.write(buffer)?;
        write_member_name(pool, &self.name, buffer)?;
        write_member_name(pool, self.descriptor.descriptor(), buffer)?;
        write_attributes(&self.lowered, pool, buffer)
    }
}

fn write_member_name<T: Write>(pool: &ConstantPool, text: &str, buffer: &mut T) -> Result<()> {
    let index = pool
        .find_utf8(text)
        .ok_or_else(|| Error::Unresolved(format!("utf8 constant {:?}", text)))?;
    buffer.write_u16::<BigEndian>(index)?;
    Ok(())
}

/// One InnerClasses table row, by name.
#[derive(Debug, Clone)]
pub struct InnerClassSpec {
    pub inner: String,
    pub outer: Option<String>,
    pub simple_name: Option<String>,
    pub access: AccessFlags,
}

#[derive(Debug, Clone)]
pub struct EnclosingMethodSpec {
    pub class: String,
    pub method: Option<(String, String)>,
}

/// A class file under construction, or one parsed back from bytes. Built
/// mutably, implicitly finalized by the first emission, and read-only from
/// then on; repeated emission produces identical bytes.
#[derive(Debug)]
pub struct ClassFile {
    version: ClassVersion,
    pub access: AccessFlags,
    pool: ConstantPool,
    this_class_name: String,
    super_class_name: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    source_file: Option<String>,
    signature: Option<String>,
    synthetic: bool,
    deprecated: bool,
    inner_classes: Vec<InnerClassSpec>,
    enclosing_method: Option<EnclosingMethodSpec>,
    extra_attributes: Vec<Attribute>,
    debug_info: bool,
    finalized: bool,
    lowered: Vec<Attribute>,
    this_index: u16,
    super_index: u16,
    interface_indices: Vec<u16>,
}

impl ClassFile {
    /// Start a class extending `super_name`. Passing no super class is only
    /// correct when building `java/lang/Object` itself.
    pub fn new(version: ClassVersion, name: &str, super_name: Option<&str>) -> ClassFile {
        ClassFile {
            version,
            access: AccessFlags::PUBLIC,
            pool: ConstantPool::new(),
            this_class_name: name.replace('.', "/"),
            super_class_name: super_name.map(|name| name.replace('.', "/")),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
            signature: None,
            synthetic: false,
            deprecated: false,
            inner_classes: Vec::new(),
            enclosing_method: None,
            extra_attributes: Vec::new(),
            debug_info: false,
            finalized: false,
            lowered: Vec::new(),
            this_index: 0,
            super_index: 0,
            interface_indices: Vec::new(),
        }
    }

    pub fn version(&self) -> ClassVersion {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.this_class_name
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_class_name.as_deref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    /// Emit LineNumberTable and LocalVariableTable attributes for methods
    /// built through the code builder.
    pub fn set_debug_info(&mut self, debug_info: bool) {
        self.debug_info = debug_info;
    }

    fn check_mutable(&self) -> Result<()> {
        if self.finalized {
            return Err(Error::Illegal(
                "class file has been emitted and is read-only".to_string(),
            ));
        }
        Ok(())
    }

    pub fn add_interface(&mut self, name: &str) -> Result<()> {
        self.check_mutable()?;
        self.interfaces.push(name.replace('.', "/"));
        Ok(())
    }

    pub fn add_field(&mut self, access: AccessFlags, name: &str, ty: &TypeDesc) -> Result<usize> {
        self.check_mutable()?;
        if self.fields.len() >= u16::MAX as usize {
            return Err(Error::PoolOverflow("field count".to_string()));
        }

        self.fields.push(FieldInfo::new(access, name, ty.clone()));
        Ok(self.fields.len() - 1)
    }

    pub fn add_method(
        &mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &MethodDesc,
    ) -> Result<usize> {
        self.check_mutable()?;
        if self.methods.len() >= u16::MAX as usize {
            return Err(Error::PoolOverflow("method count".to_string()));
        }

        self.methods
            .push(MethodInfo::new(access, name, descriptor.clone()));
        Ok(self.methods.len() - 1)
    }

    pub fn add_constructor(&mut self, access: AccessFlags, params: &[TypeDesc]) -> Result<usize> {
        let descriptor = MethodDesc::new(TypeDesc::void(), params.to_vec())?;
        self.add_method(access, "<init>", &descriptor)
    }

    pub fn add_static_initializer(&mut self) -> Result<usize> {
        let descriptor = MethodDesc::new(TypeDesc::void(), Vec::new())?;
        self.add_method(AccessFlags::STATIC, "<clinit>", &descriptor)
    }

    /// A public constructor that only calls the super constructor.
    pub fn add_default_constructor(&mut self) -> Result<usize> {
        let index = self.add_constructor(AccessFlags::PUBLIC, &[])?;
        let super_name = match &self.super_class_name {
            Some(name) => name.clone(),
            None => {
                return Err(Error::Illegal(
                    "default constructor requires a super class".to_string(),
                ))
            }
        };

        let mut code = self.code(index)?;
        code.load_this()?;
        code.invoke_constructor(&super_name, &[])?;
        code.return_void()?;
        Ok(index)
    }

    pub fn field_mut(&mut self, index: usize) -> Result<&mut FieldInfo> {
        self.check_mutable()?;
        self.fields
            .get_mut(index)
            .ok_or_else(|| Error::Illegal(format!("no field {}", index)))
    }

    pub fn method_mut(&mut self, index: usize) -> Result<&mut MethodInfo> {
        self.check_mutable()?;
        self.methods
            .get_mut(index)
            .ok_or_else(|| Error::Illegal(format!("no method {}", index)))
    }

    /// Open a code builder for a method added earlier. Abstract and native
    /// methods cannot carry code.
    pub fn code(&mut self, method: usize) -> Result<CodeBuilder<'_>> {
        self.check_mutable()?;

        let ClassFile {
            pool,
            methods,
            this_class_name,
            version,
            ..
        } = self;

        let method = methods
            .get_mut(method)
            .ok_or_else(|| Error::Illegal(format!("no method {}", method)))?;

        if method
            .access
            .intersects(AccessFlags::ABSTRACT | AccessFlags::NATIVE)
        {
            return Err(Error::Illegal(format!(
                "abstract or native method {} cannot have code",
                method.name
            )));
        }

        let is_static = method.access.contains(AccessFlags::STATIC);
        let descriptor = method.descriptor.clone();
        let list = method.code.get_or_insert_with(InstructionList::new);

        CodeBuilder::new(pool, list, this_class_name, &descriptor, is_static, *version)
    }

    pub fn set_source_file(&mut self, name: &str) {
        self.source_file = Some(name.to_string());
    }

    pub fn set_signature(&mut self, signature: &str) {
        self.signature = Some(signature.to_string());
    }

    pub fn set_synthetic(&mut self) {
        self.synthetic = true;
    }

    pub fn set_deprecated(&mut self) {
        self.deprecated = true;
    }

    pub fn add_inner_class(&mut self, spec: InnerClassSpec) -> Result<()> {
        self.check_mutable()?;
        self.inner_classes.push(spec);
        Ok(())
    }

    pub fn inner_classes(&self) -> &[InnerClassSpec] {
        &self.inner_classes
    }

    pub fn set_enclosing_method(&mut self, spec: EnclosingMethodSpec) {
        self.enclosing_method = Some(spec);
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.extra_attributes.push(attribute);
    }

    /// Resolve every name and assemble every method body. Runs once; called
    /// implicitly by the first emission.
    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }

        if self.interfaces.len() > u16::MAX as usize {
            return Err(Error::PoolOverflow("interface count".to_string()));
        }

        self.this_index = self.pool.add_class_name(&self.this_class_name)?;
        self.super_index = match &self.super_class_name {
            Some(name) => self.pool.add_class_name(name)?,
            None => 0,
        };

        self.interface_indices.clear();
        for interface in &self.interfaces {
            self.interface_indices
                .push(self.pool.add_class_name(interface)?);
        }

        let ClassFile {
            pool,
            fields,
            methods,
            this_class_name,
            version,
            debug_info,
            ..
        } = self;

        for field in fields.iter_mut() {
            field.lower(pool)?;
        }
        for method in methods.iter_mut() {
            method.lower(pool, this_class_name, *version, *debug_info)?;
        }

        let mut attributes = Vec::new();
        if let Some(name) = &self.source_file {
            attributes.push(Attribute::SourceFile(SourceFile {
                index: self.pool.add_utf8(name)?,
            }));
        }
        if !self.inner_classes.is_empty() {
            let mut classes = Vec::with_capacity(self.inner_classes.len());
            for spec in &self.inner_classes {
                classes.push(InnerClass {
                    inner_class_info: self.pool.add_class_name(&spec.inner)?,
                    outer_class_info: match &spec.outer {
                        Some(outer) => self.pool.add_class_name(outer)?,
                        None => 0,
                    },
                    inner_name_index: match &spec.simple_name {
                        Some(name) => self.pool.add_utf8(name)?,
                        None => 0,
                    },
                    inner_class_access_flags: spec.access,
                });
            }
            attributes.push(Attribute::InnerClasses(InnerClasses { classes }));
        }
        if let Some(spec) = &self.enclosing_method {
            attributes.push(Attribute::EnclosingMethod(EnclosingMethod {
                class_index: self.pool.add_class_name(&spec.class)?,
                method_index: match &spec.method {
                    Some((name, descriptor)) => {
                        self.pool.add_name_and_type(name, descriptor)?
                    }
                    None => 0,
                },
            }));
        }
        if self.synthetic {
            attributes.push(Attribute::Synthetic);
        }
        if self.deprecated {
            attributes.push(Attribute::Deprecated);
        }
        if let Some(signature) = &self.signature {
            attributes.push(Attribute::Signature(Signature {
                index: self.pool.add_utf8(signature)?,
            }));
        }
        attributes.extend(self.extra_attributes.iter().cloned());

        for attribute in &attributes {
            attribute.register(&mut self.pool)?;
        }

        self.lowered = attributes;
        self.finalized = true;
        Ok(())
    }

    /// Emit the class file. The first call finalizes the builder; later
    /// calls reproduce the same bytes.
    pub fn write(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }

    pub fn write_to<T: Write>(&mut self, buffer: &mut T) -> Result<()> {
        self.finalize()?;

        buffer.write_u32::<BigEndian>(0xCAFE_BABE)?;
        self.version.write(buffer)?;
        self.pool.write(buffer)?;

        // The SUPER bit (the SYNCHRONIZED sentinel) is always set on the
        // class for JVM compatibility.
        (self.access | AccessFlags::SUPER).write(buffer)?;

        buffer.write_u16::<BigEndian>(self.this_index)?;
        buffer.write_u16::<BigEndian>(self.super_index)?;

        buffer.write_u16::<BigEndian>(self.interface_indices.len() as u16)?;
        for index in &self.interface_indices {
            buffer.write_u16::<BigEndian>(*index)?;
        }

        buffer.write_u16::<BigEndian>(self.fields.len() as u16)?;
        for field in &self.fields {
            field.write_to(&self.pool, buffer)?;
        }

        buffer.write_u16::<BigEndian>(self.methods.len() as u16)?;
        for method in &self.methods {
            method.write_to(&self.pool, buffer)?;
        }

        write_attributes(&self.lowered, &self.pool, buffer)
    }

    pub fn read<T: Read>(buffer: &mut T) -> Result<ClassFile> {
        ClassFile::read_with_factory(buffer, None)
    }

    /// Strict parse. A factory, when supplied, is consulted for attribute
    /// names the crate does not recognize.
    pub fn read_with_factory<T: Read>(
        buffer: &mut T,
        factory: Option<&dyn AttributeFactory>,
    ) -> Result<ClassFile> {
        if !check_magic_number(buffer)? {
            return Err(Error::Malformed("bad magic number".to_string()));
        }

        let version = ClassVersion::read(buffer)?;
        trace!("class version {:?}", version);

        let pool = ConstantPool::read(buffer)?;
        trace!("read {} constant pool slots", pool.slots());

        let access = AccessFlags::read(buffer)?;
        let this_index = buffer.read_u16::<BigEndian>()?;
        let super_index = buffer.read_u16::<BigEndian>()?;

        let this_class_name = pool.class_name(this_index)?.to_string();
        let super_class_name = match super_index {
            0 => None,
            index => Some(pool.class_name(index)?.to_string()),
        };
        trace!("class {} extends {:?}", this_class_name, super_class_name);

        let interface_count = buffer.read_u16::<BigEndian>()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        let mut interface_indices = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            let index = buffer.read_u16::<BigEndian>()?;
            interfaces.push(pool.class_name(index)?.to_string());
            interface_indices.push(index);
        }

        let field_count = buffer.read_u16::<BigEndian>()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(read_field(buffer, &pool, factory)?);
        }
        trace!("read {} field(s)", fields.len());

        let method_count = buffer.read_u16::<BigEndian>()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(read_method(buffer, &pool, factory)?);
        }
        trace!("read {} method(s)", methods.len());

        let attributes = read_attributes(buffer, &pool, factory)?;

        let mut class = ClassFile {
            version,
            access,
            pool,
            this_class_name,
            super_class_name,
            interfaces,
            fields,
            methods,
            source_file: None,
            signature: None,
            synthetic: false,
            deprecated: false,
            inner_classes: Vec::new(),
            enclosing_method: None,
            extra_attributes: Vec::new(),
            debug_info: false,
            finalized: false,
            lowered: Vec::new(),
            this_index,
            super_index,
            interface_indices,
        };

        for attribute in attributes {
            match attribute {
                Attribute::SourceFile(v) => {
                    class.source_file = Some(class.pool.text(v.index)?.to_string())
                }
                Attribute::Signature(v) => {
                    class.signature = Some(class.pool.text(v.index)?.to_string())
                }
                Attribute::Synthetic => class.synthetic = true,
                Attribute::Deprecated => class.deprecated = true,
                Attribute::InnerClasses(v) => {
                    for inner in v.classes {
                        let spec = InnerClassSpec {
                            inner: class.pool.class_name(inner.inner_class_info)?.to_string(),
                            outer: match inner.outer_class_info {
                                0 => None,
                                index => Some(class.pool.class_name(index)?.to_string()),
                            },
                            simple_name: match inner.inner_name_index {
                                0 => None,
                                index => Some(class.pool.text(index)?.to_string()),
                            },
                            access: inner.inner_class_access_flags,
                        };
                        class.inner_classes.push(spec);
                    }
                }
                Attribute::EnclosingMethod(v) => {
                    let method = match v.method_index {
                        0 => None,
                        index => {
                            let (name, descriptor) = class.pool.name_and_type(index)?;
                            Some((name.to_string(), descriptor.to_string()))
                        }
                    };
                    class.enclosing_method = Some(EnclosingMethodSpec {
                        class: class.pool.class_name(v.class_index)?.to_string(),
                        method,
                    });
                }
                other => class.extra_attributes.push(other),
            }
        }

        Ok(class)
    }
}

fn read_field<T: Read>(
    buffer: &mut T,
    pool: &ConstantPool,
    factory: Option<&dyn AttributeFactory>,
) -> Result<FieldInfo> {
    let access = AccessFlags::read(buffer)?;
    let name_index = buffer.read_u16::<BigEndian>()?;
    let descriptor_index = buffer.read_u16::<BigEndian>()?;

    let name = pool.text(name_index)?.to_string();
    let ty = TypeDesc::parse(pool.text(descriptor_index)?)?;
    let mut field = FieldInfo::new(access, &name, ty);

    for attribute in read_attributes(buffer, pool, factory)? {
        match attribute {
            Attribute::ConstantValue(v) => {
                field.constant_value = Some(match pool.get(v.index) {
                    Some(Constant::Int(c)) => FieldConstant::Int(c.value),
                    Some(Constant::Long(c)) => FieldConstant::Long(c.value),
                    Some(Constant::Float(c)) => FieldConstant::Float(c.value),
                    Some(Constant::Double(c)) => FieldConstant::Double(c.value),
                    Some(Constant::String(c)) => {
                        FieldConstant::Str(pool.text(c.string_index)?.to_string())
                    }
                    x => {
                        return Err(Error::Malformed(format!(
                            "ConstantValue points at {:?}",
                            x
                        )))
                    }
                });
            }
            Attribute::Signature(v) => field.signature = Some(pool.text(v.index)?.to_string()),
            Attribute::Synthetic => field.synthetic = true,
            Attribute::Deprecated => field.deprecated = true,
            other => field.extra_attributes.push(other),
        }
    }

    Ok(field)
}

fn read_method<T: Read>(
    buffer: &mut T,
    pool: &ConstantPool,
    factory: Option<&dyn AttributeFactory>,
) -> Result<MethodInfo> {
    let access = AccessFlags::read(buffer)?;
    let name_index = buffer.read_u16::<BigEndian>()?;
    let descriptor_index = buffer.read_u16::<BigEndian>()?;

    let name = pool.text(name_index)?.to_string();
    let descriptor = MethodDesc::parse(pool.text(descriptor_index)?)?;
    let mut method = MethodInfo::new(access, &name, descriptor);

    for attribute in read_attributes(buffer, pool, factory)? {
        match attribute {
            Attribute::Code(v) => method.lowered_code = Some(v),
            Attribute::Exceptions(v) => {
                for index in v.class_indices {
                    method.exceptions.push(pool.class_name(index)?.to_string());
                }
            }
            Attribute::Signature(v) => method.signature = Some(pool.text(v.index)?.to_string()),
            Attribute::Synthetic => method.synthetic = true,
            Attribute::Deprecated => method.deprecated = true,
            other => method.extra_attributes.push(other),
        }
    }

    Ok(method)
}
