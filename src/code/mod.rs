//! The typed facade over an instruction list. One method per opcode family,
//! plus the conversion lattice between primitives and their wrapper classes.

use crate::class::constant::ConstantPool;
use crate::class::version::ClassVersion;
use crate::descriptor::{MethodDesc, TypeDesc, TypeKind};
use crate::error::{Error, Result};
use crate::instruction::list::{ExceptionHandler, InstructionList};
use crate::instruction::{op, Instruction, Label, LocalKind, SwitchData, ValueKind, VarId};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Comparison {
    fn index(self) -> u8 {
        match self {
            Comparison::Eq => 0,
            Comparison::Ne => 1,
            Comparison::Lt => 2,
            Comparison::Ge => 3,
            Comparison::Gt => 4,
            Comparison::Le => 5,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

/// Builds the body of one method. Obtained from
/// [ClassFile::code](crate::ClassFile::code); instructions append to the
/// owning method's list and constants intern into the class pool.
pub struct CodeBuilder<'a> {
    pool: &'a mut ConstantPool,
    list: &'a mut InstructionList,
    descriptor: MethodDesc,
    version: ClassVersion,
    this_var: Option<VarId>,
    params: Vec<VarId>,
}

impl<'a> CodeBuilder<'a> {
    pub(crate) fn new(
        pool: &'a mut ConstantPool,
        list: &'a mut InstructionList,
        class_name: &str,
        descriptor: &MethodDesc,
        is_static: bool,
        version: ClassVersion,
    ) -> Result<CodeBuilder<'a>> {
        let mut this_var = None;
        let mut params = Vec::with_capacity(descriptor.params().len());

        if list.variables.is_empty() {
            let mut register = 0u16;
            if !is_static {
                let this_type = TypeDesc::object(class_name);
                this_var = Some(list.declare(Some("this".to_string()), this_type, Some(0))?);
                register = 1;
            }

            for (position, param) in descriptor.params().iter().enumerate() {
                let name = format!("arg{}", position);
                params.push(list.declare(Some(name), param.clone(), Some(register))?);
                register += param.word_size();
            }
        } else {
            // Re-entering a method that already declared its parameters.
            let mut next = 0;
            if !is_static {
                this_var = Some(VarId(0));
                next = 1;
            }
            for position in 0..descriptor.params().len() {
                params.push(VarId(next + position as u16));
            }
        }

        Ok(CodeBuilder {
            pool,
            list,
            descriptor: descriptor.clone(),
            version,
            this_var,
            params,
        })
    }

    pub fn this_var(&self) -> Option<VarId> {
        self.this_var
    }

    pub fn param(&self, position: usize) -> Result<VarId> {
        self.params.get(position).copied().ok_or_else(|| {
            Error::Illegal(format!("method has no parameter {}", position))
        })
    }

    pub fn declare_local(&mut self, name: Option<&str>, ty: &TypeDesc) -> Result<VarId> {
        self.list
            .declare(name.map(str::to_string), ty.clone(), None)
    }

    pub fn new_label(&mut self) -> Label {
        self.list.new_label()
    }

    pub fn bind(&mut self, label: Label) -> Result<()> {
        self.list.bind(label)
    }

    pub fn map_line_number(&mut self, line: u16) {
        self.list.mark_line(line);
    }

    pub fn nop(&mut self) {
        self.list.push(Instruction::Simple(op::NOP));
    }

    // ---- constants ------------------------------------------------------

    pub fn load_null(&mut self) {
        self.list.push(Instruction::Simple(op::ACONST_NULL));
    }

    pub fn load_int(&mut self, value: i32) -> Result<()> {
        let instruction = match value {
            -1..=5 => Instruction::Simple((value + 3) as u8),
            -128..=127 => Instruction::Immediate {
                opcode: op::BIPUSH,
                operand: value as i16,
            },
            -32768..=32767 => Instruction::Immediate {
                opcode: op::SIPUSH,
                operand: value as i16,
            },
            _ => Instruction::LoadConst {
                index: self.pool.add_integer(value)?,
                wide: false,
            },
        };

        self.list.push(instruction);
        Ok(())
    }

    pub fn load_long(&mut self, value: i64) -> Result<()> {
        let instruction = match value {
            0 => Instruction::Simple(op::LCONST_0),
            1 => Instruction::Simple(op::LCONST_1),
            _ => Instruction::LoadConst {
                index: self.pool.add_long(value)?,
                wide: true,
            },
        };

        self.list.push(instruction);
        Ok(())
    }

    pub fn load_float(&mut self, value: f32) -> Result<()> {
        let instruction = if value.to_bits() == 0f32.to_bits() {
            Instruction::Simple(op::FCONST_0)
        } else if value == 1.0 {
            Instruction::Simple(op::FCONST_1)
        } else if value == 2.0 {
            Instruction::Simple(op::FCONST_2)
        } else {
            Instruction::LoadConst {
                index: self.pool.add_float(value)?,
                wide: false,
            }
        };

        self.list.push(instruction);
        Ok(())
    }

    pub fn load_double(&mut self, value: f64) -> Result<()> {
        let instruction = if value.to_bits() == 0f64.to_bits() {
            Instruction::Simple(op::DCONST_0)
        } else if value == 1.0 {
            Instruction::Simple(op::DCONST_1)
        } else {
            Instruction::LoadConst {
                index: self.pool.add_double(value)?,
                wide: true,
            }
        };

        self.list.push(instruction);
        Ok(())
    }

    pub fn load_string(&mut self, value: &str) -> Result<()> {
        let index = self.pool.add_string(value)?;
        self.list.push(Instruction::LoadConst { index, wide: false });
        Ok(())
    }

    /// Push a Class object. Only legal from class file version 49.0 on.
    pub fn load_class_constant(&mut self, ty: &TypeDesc) -> Result<()> {
        if !self.version.allows_class_constants() {
            return Err(Error::Illegal(
                "class constants on the stack require version 49.0".to_string(),
            ));
        }

        let index = self.pool.add_class(ty)?;
        self.list.push(Instruction::LoadConst { index, wide: false });
        Ok(())
    }

    // ---- locals ---------------------------------------------------------

    pub fn load_this(&mut self) -> Result<()> {
        match self.this_var {
            Some(var) => self.load_local(var),
            None => Err(Error::Illegal("static method has no this".to_string())),
        }
    }

    pub fn load_local(&mut self, var: VarId) -> Result<()> {
        let kind = ValueKind::of(self.list.variable_type(var))?;
        self.list.push(Instruction::LocalOp {
            kind: LocalKind::Load(kind),
            var,
        });
        Ok(())
    }

    pub fn store_local(&mut self, var: VarId) -> Result<()> {
        let kind = ValueKind::of(self.list.variable_type(var))?;
        self.list.push(Instruction::LocalOp {
            kind: LocalKind::Store(kind),
            var,
        });
        Ok(())
    }

    pub fn inc_local(&mut self, var: VarId, delta: i16) -> Result<()> {
        if ValueKind::of(self.list.variable_type(var))? != ValueKind::Int {
            return Err(Error::Illegal(format!(
                "iinc of a non-integer variable of type {}",
                self.list.variable_type(var)
            )));
        }

        self.list.push(Instruction::Iinc { var, delta });
        Ok(())
    }

    // ---- fields ---------------------------------------------------------

    fn field_op(&mut self, opcode: u8, class: &str, name: &str, ty: &TypeDesc) -> Result<()> {
        let class = class.replace('.', "/");
        let index = self.pool.add_field_ref(&class, name, ty.descriptor())?;
        self.list.push(Instruction::ConstOp { opcode, index });
        Ok(())
    }

    pub fn get_field(&mut self, class: &str, name: &str, ty: &TypeDesc) -> Result<()> {
        self.field_op(op::GETFIELD, class, name, ty)
    }

    pub fn put_field(&mut self, class: &str, name: &str, ty: &TypeDesc) -> Result<()> {
        self.field_op(op::PUTFIELD, class, name, ty)
    }

    pub fn get_static(&mut self, class: &str, name: &str, ty: &TypeDesc) -> Result<()> {
        self.field_op(op::GETSTATIC, class, name, ty)
    }

    pub fn put_static(&mut self, class: &str, name: &str, ty: &TypeDesc) -> Result<()> {
        self.field_op(op::PUTSTATIC, class, name, ty)
    }

    // ---- invocation -----------------------------------------------------

    fn invoke(
        &mut self,
        opcode: u8,
        class: &str,
        name: &str,
        descriptor: &MethodDesc,
    ) -> Result<()> {
        let class = class.replace('.', "/");
        let index = if opcode == op::INVOKEINTERFACE {
            self.pool
                .add_interface_method_ref(&class, name, descriptor.descriptor())?
        } else {
            self.pool
                .add_method_ref(&class, name, descriptor.descriptor())?
        };

        let receiver = if opcode == op::INVOKESTATIC { 0 } else { 1 };
        let args = receiver + descriptor.param_words();
        if args > u8::MAX as u16 {
            return Err(Error::Illegal(format!(
                "{} argument words exceed 255",
                args
            )));
        }

        self.list.push(Instruction::Invoke {
            opcode,
            index,
            args: args as u8,
            ret: descriptor.returns().word_size() as u8,
        });
        Ok(())
    }

    pub fn invoke_virtual(&mut self, class: &str, name: &str, desc: &MethodDesc) -> Result<()> {
        self.invoke(op::INVOKEVIRTUAL, class, name, desc)
    }

    pub fn invoke_static(&mut self, class: &str, name: &str, desc: &MethodDesc) -> Result<()> {
        self.invoke(op::INVOKESTATIC, class, name, desc)
    }

    pub fn invoke_special(&mut self, class: &str, name: &str, desc: &MethodDesc) -> Result<()> {
        self.invoke(op::INVOKESPECIAL, class, name, desc)
    }

    pub fn invoke_interface(&mut self, class: &str, name: &str, desc: &MethodDesc) -> Result<()> {
        self.invoke(op::INVOKEINTERFACE, class, name, desc)
    }

    /// invokespecial of `<init>` with the given parameter list.
    pub fn invoke_constructor(&mut self, class: &str, params: &[TypeDesc]) -> Result<()> {
        let descriptor = MethodDesc::new(TypeDesc::void(), params.to_vec())?;
        self.invoke(op::INVOKESPECIAL, class, "<init>", &descriptor)
    }

    // ---- objects and arrays ---------------------------------------------

    /// Allocate an uninitialized instance. The caller must arrange the
    /// matching constructor call.
    pub fn new_object(&mut self, ty: &TypeDesc) -> Result<()> {
        match ty.kind() {
            TypeKind::Object(_) => {}
            _ => {
                return Err(Error::Illegal(format!(
                    "new of a non-class type {}; use new_array",
                    ty
                )))
            }
        }

        let index = self.pool.add_class(ty)?;
        self.list.push(Instruction::New { index });
        Ok(())
    }

    /// Allocate an array with `dims` dimension counts already on the stack.
    pub fn new_array(&mut self, ty: &TypeDesc, dims: u8) -> Result<()> {
        if dims == 0 || (dims as u8) > ty.rank() {
            return Err(Error::Illegal(format!(
                "cannot create {} with {} dimensions",
                ty, dims
            )));
        }

        if dims > 1 {
            let index = self.pool.add_class(ty)?;
            self.list.push(Instruction::MultiNewArray { index, dims });
            return Ok(());
        }

        let element = match ty.element_type() {
            Some(element) => element.clone(),
            None => return Err(Error::Illegal(format!("{} is not an array type", ty))),
        };

        if element.is_primitive() {
            let code = match element.kind() {
                TypeKind::Boolean => op::T_BOOLEAN,
                TypeKind::Char => op::T_CHAR,
                TypeKind::Float => op::T_FLOAT,
                TypeKind::Double => op::T_DOUBLE,
                TypeKind::Byte => op::T_BYTE,
                TypeKind::Short => op::T_SHORT,
                TypeKind::Int => op::T_INT,
                TypeKind::Long => op::T_LONG,
                _ => unreachable!(),
            };
            self.list.push(Instruction::Immediate {
                opcode: op::NEWARRAY,
                operand: code,
            });
        } else {
            let index = self.pool.add_class(&element)?;
            self.list.push(Instruction::ConstOp {
                opcode: op::ANEWARRAY,
                index,
            });
        }

        Ok(())
    }

    pub fn array_length(&mut self) {
        self.list.push(Instruction::Simple(op::ARRAYLENGTH));
    }

    pub fn load_from_array(&mut self, element: &TypeDesc) -> Result<()> {
        let opcode = match element.kind() {
            TypeKind::Boolean | TypeKind::Byte => op::BALOAD,
            TypeKind::Char => op::CALOAD,
            TypeKind::Short => op::SALOAD,
            TypeKind::Int => op::IALOAD,
            TypeKind::Long => op::LALOAD,
            TypeKind::Float => op::FALOAD,
            TypeKind::Double => op::DALOAD,
            TypeKind::Object(_) | TypeKind::Array(_) => op::AALOAD,
            TypeKind::Void => return Err(Error::Illegal("array of void".to_string())),
        };
        self.list.push(Instruction::Simple(opcode));
        Ok(())
    }

    pub fn store_to_array(&mut self, element: &TypeDesc) -> Result<()> {
        let opcode = match element.kind() {
            TypeKind::Boolean | TypeKind::Byte => op::BASTORE,
            TypeKind::Char => op::CASTORE,
            TypeKind::Short => op::SASTORE,
            TypeKind::Int => op::IASTORE,
            TypeKind::Long => op::LASTORE,
            TypeKind::Float => op::FASTORE,
            TypeKind::Double => op::DASTORE,
            TypeKind::Object(_) | TypeKind::Array(_) => op::AASTORE,
            TypeKind::Void => return Err(Error::Illegal("array of void".to_string())),
        };
        self.list.push(Instruction::Simple(opcode));
        Ok(())
    }

    pub fn check_cast(&mut self, ty: &TypeDesc) -> Result<()> {
        let index = self.pool.add_class(ty)?;
        self.list.push(Instruction::ConstOp {
            opcode: op::CHECKCAST,
            index,
        });
        Ok(())
    }

    pub fn instance_of(&mut self, ty: &TypeDesc) -> Result<()> {
        let index = self.pool.add_class(ty)?;
        self.list.push(Instruction::ConstOp {
            opcode: op::INSTANCEOF,
            index,
        });
        Ok(())
    }

    // ---- arithmetic -----------------------------------------------------

    pub fn math(&mut self, operation: MathOp, ty: &TypeDesc) -> Result<()> {
        let kind = ValueKind::of(ty)?;
        let family = match kind {
            ValueKind::Int => 0,
            ValueKind::Long => 1,
            ValueKind::Float => 2,
            ValueKind::Double => 3,
            ValueKind::Reference => {
                return Err(Error::Illegal(format!("no arithmetic on {}", ty)))
            }
        };

        let integral = family <= 1;
        let opcode = match operation {
            MathOp::Add => op::IADD + family,
            MathOp::Sub => op::ISUB + family,
            MathOp::Mul => op::IMUL + family,
            MathOp::Div => op::IDIV + family,
            MathOp::Rem => op::IREM + family,
            MathOp::Neg => op::INEG + family,
            MathOp::Shl if integral => op::ISHL + family,
            MathOp::Shr if integral => op::ISHR + family,
            MathOp::Ushr if integral => op::IUSHR + family,
            MathOp::And if integral => op::IAND + family,
            MathOp::Or if integral => op::IOR + family,
            MathOp::Xor if integral => op::IXOR + family,
            x => {
                return Err(Error::Illegal(format!(
                    "{:?} is not defined for {}",
                    x, ty
                )))
            }
        };

        self.list.push(Instruction::Simple(opcode));
        Ok(())
    }

    /// lcmp / fcmpl / fcmpg / dcmpl / dcmpg. `nan_positive` selects the
    /// variant pushing 1 on an unordered comparison.
    pub fn compare(&mut self, ty: &TypeDesc, nan_positive: bool) -> Result<()> {
        let opcode = match ValueKind::of(ty)? {
            ValueKind::Long => op::LCMP,
            ValueKind::Float => {
                if nan_positive {
                    op::FCMPG
                } else {
                    op::FCMPL
                }
            }
            ValueKind::Double => {
                if nan_positive {
                    op::DCMPG
                } else {
                    op::DCMPL
                }
            }
            _ => {
                return Err(Error::Illegal(format!(
                    "compare is not defined for {}",
                    ty
                )))
            }
        };

        self.list.push(Instruction::Simple(opcode));
        Ok(())
    }

    // ---- control flow ---------------------------------------------------

    pub fn branch(&mut self, target: Label) {
        self.list.push(Instruction::Branch {
            opcode: op::GOTO,
            target,
            wide: false,
        });
    }

    pub fn if_zero(&mut self, comparison: Comparison, target: Label) {
        self.list.push(Instruction::Branch {
            opcode: op::IFEQ + comparison.index(),
            target,
            wide: false,
        });
    }

    pub fn if_compare_int(&mut self, comparison: Comparison, target: Label) {
        self.list.push(Instruction::Branch {
            opcode: op::IF_ICMPEQ + comparison.index(),
            target,
            wide: false,
        });
    }

    pub fn if_compare_ref(&mut self, equal: bool, target: Label) {
        self.list.push(Instruction::Branch {
            opcode: if equal { op::IF_ACMPEQ } else { op::IF_ACMPNE },
            target,
            wide: false,
        });
    }

    pub fn if_null(&mut self, target: Label) {
        self.list.push(Instruction::Branch {
            opcode: op::IFNULL,
            target,
            wide: false,
        });
    }

    pub fn if_non_null(&mut self, target: Label) {
        self.list.push(Instruction::Branch {
            opcode: op::IFNONNULL,
            target,
            wide: false,
        });
    }

    pub fn switch_(&mut self, cases: &[(i32, Label)], default: Label) -> Result<()> {
        let mut cases = cases.to_vec();
        cases.sort_by_key(|(value, _)| *value);

        for pair in cases.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(Error::Illegal(format!(
                    "duplicate switch case {}",
                    pair[0].0
                )));
            }
        }

        self.list
            .push(Instruction::Switch(SwitchData { default, cases }));
        Ok(())
    }

    pub fn jump_subroutine(&mut self, target: Label) {
        self.list.push(Instruction::Branch {
            opcode: op::JSR,
            target,
            wide: false,
        });
    }

    pub fn ret(&mut self, var: VarId) {
        self.list.push(Instruction::LocalOp {
            kind: LocalKind::Ret,
            var,
        });
    }

    pub fn throw_object(&mut self) {
        self.list.push(Instruction::Simple(op::ATHROW));
    }

    pub fn return_void(&mut self) -> Result<()> {
        if !self.descriptor.returns_void() {
            return Err(Error::Illegal(format!(
                "return without a value from a method returning {}",
                self.descriptor.returns()
            )));
        }

        self.list.push(Instruction::Simple(op::RETURN));
        Ok(())
    }

    pub fn return_value(&mut self, ty: &TypeDesc) -> Result<()> {
        let expected = self.descriptor.returns();
        if expected.is_void() {
            return Err(Error::Illegal(
                "value returned from a void method".to_string(),
            ));
        }
        if ValueKind::of(ty)? != ValueKind::of(expected)? {
            return Err(Error::Illegal(format!(
                "cannot return {} from a method returning {}",
                ty, expected
            )));
        }

        let family = match ValueKind::of(ty)? {
            ValueKind::Int => 0,
            ValueKind::Long => 1,
            ValueKind::Float => 2,
            ValueKind::Double => 3,
            ValueKind::Reference => 4,
        };
        self.list.push(Instruction::Simple(op::IRETURN + family));
        Ok(())
    }

    pub fn monitor_enter(&mut self) {
        self.list.push(Instruction::Simple(op::MONITORENTER));
    }

    pub fn monitor_exit(&mut self) {
        self.list.push(Instruction::Simple(op::MONITOREXIT));
    }

    /// Register a try region. `catch_type` of `None` makes this a finally
    /// handler.
    pub fn exception_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<()> {
        let catch_type = match catch_type {
            Some(name) => Some(self.pool.add_class_name(&name.replace('.', "/"))?),
            None => None,
        };

        self.list.add_exception_handler(ExceptionHandler {
            start,
            end,
            handler,
            catch_type,
        });
        Ok(())
    }

    // ---- stack shuffling ------------------------------------------------

    pub fn pop(&mut self) {
        self.list.push(Instruction::StackOp(op::POP));
    }

    pub fn pop2(&mut self) {
        self.list.push(Instruction::StackOp(op::POP2));
    }

    pub fn dup(&mut self) {
        self.list.push(Instruction::StackOp(op::DUP));
    }

    pub fn dup_x1(&mut self) {
        self.list.push(Instruction::StackOp(op::DUP_X1));
    }

    pub fn dup_x2(&mut self) {
        self.list.push(Instruction::StackOp(op::DUP_X2));
    }

    pub fn dup2(&mut self) {
        self.list.push(Instruction::StackOp(op::DUP2));
    }

    pub fn dup2_x1(&mut self) {
        self.list.push(Instruction::StackOp(op::DUP2_X1));
    }

    pub fn dup2_x2(&mut self) {
        self.list.push(Instruction::StackOp(op::DUP2_X2));
    }

    pub fn swap(&mut self) {
        self.list.push(Instruction::StackOp(op::SWAP));
    }

    // ---- conversion -----------------------------------------------------

    /// Convert the value on top of the stack from `from` to `to`: primitive
    /// widening and narrowing, boxing and unboxing through the wrapper
    /// classes, and reference casts. Converting a type to itself inserts
    /// nothing; a null wrapper converts to another wrapper as null.
    pub fn convert(&mut self, from: &TypeDesc, to: &TypeDesc) -> Result<()> {
        if from == to {
            return Ok(());
        }

        match (wrapper_primitive(from), wrapper_primitive(to)) {
            // primitive -> primitive
            (None, None) if from.is_primitive() && to.is_primitive() => {
                self.convert_primitive(from, to)
            }
            // primitive -> wrapper (or a supertype of the wrapper)
            (None, Some(target)) if from.is_primitive() => self.box_value(from, &target),
            (None, None) if from.is_primitive() && is_boxing_supertype(to) => {
                self.box_value(from, from)
            }
            // wrapper -> primitive
            (Some(source), None) if to.is_primitive() => {
                self.unbox_value(from, &source)?;
                self.convert_primitive(&source, to)
            }
            // wrapper -> wrapper, passing null through untouched
            (Some(source), Some(target)) => {
                let done = self.new_label();
                let null_case = self.new_label();

                self.dup();
                self.if_null(null_case);
                self.unbox_value(from, &source)?;
                self.convert_primitive(&source, &target)?;
                self.box_value(&target, &target)?;
                self.branch(done);
                self.bind(null_case)?;
                self.check_cast(to)?;
                self.bind(done)?;
                Ok(())
            }
            // reference -> reference
            _ if from.is_reference() && to.is_reference() => self.check_cast(to),
            _ => Err(Error::Illegal(format!(
                "no conversion from {} to {}",
                from, to
            ))),
        }
    }

    fn convert_primitive(&mut self, from: &TypeDesc, to: &TypeDesc) -> Result<()> {
        if from == to {
            return Ok(());
        }

        let source = ValueKind::of(from)?;
        let target = ValueKind::of(to)?;

        if matches!(to.kind(), TypeKind::Boolean) {
            return self.to_boolean(source);
        }

        // First move between the four stack categories...
        let between = match (source, target) {
            (a, b) if a == b => None,
            (ValueKind::Int, ValueKind::Long) => Some(op::I2L),
            (ValueKind::Int, ValueKind::Float) => Some(op::I2F),
            (ValueKind::Int, ValueKind::Double) => Some(op::I2D),
            (ValueKind::Long, ValueKind::Int) => Some(op::L2I),
            (ValueKind::Long, ValueKind::Float) => Some(op::L2F),
            (ValueKind::Long, ValueKind::Double) => Some(op::L2D),
            (ValueKind::Float, ValueKind::Int) => Some(op::F2I),
            (ValueKind::Float, ValueKind::Long) => Some(op::F2L),
            (ValueKind::Float, ValueKind::Double) => Some(op::F2D),
            (ValueKind::Double, ValueKind::Int) => Some(op::D2I),
            (ValueKind::Double, ValueKind::Long) => Some(op::D2L),
            (ValueKind::Double, ValueKind::Float) => Some(op::D2F),
            _ => {
                return Err(Error::Illegal(format!(
                    "no conversion from {} to {}",
                    from, to
                )))
            }
        };
        if let Some(opcode) = between {
            self.list.push(Instruction::Simple(opcode));
        }

        // ...then truncate inside the int category.
        match to.kind() {
            TypeKind::Byte => self.list.push(Instruction::Simple(op::I2B)),
            TypeKind::Char => self.list.push(Instruction::Simple(op::I2C)),
            TypeKind::Short => self.list.push(Instruction::Simple(op::I2S)),
            _ => {}
        }

        Ok(())
    }

    /// `x != 0`, with NaN mapping to false for floating point sources.
    fn to_boolean(&mut self, source: ValueKind) -> Result<()> {
        match source {
            ValueKind::Int => {
                let if_zero = self.new_label();
                let done = self.new_label();
                self.if_zero(Comparison::Eq, if_zero);
                self.load_int(1)?;
                self.branch(done);
                self.bind(if_zero)?;
                self.load_int(0)?;
                self.bind(done)?;
            }
            ValueKind::Long => {
                self.load_long(0)?;
                self.compare(&TypeDesc::long(), false)?;
                self.to_boolean(ValueKind::Int)?;
            }
            ValueKind::Float | ValueKind::Double => {
                let double = source == ValueKind::Double;
                let true_with_copy = self.new_label();
                let true_case = self.new_label();
                let done = self.new_label();

                // x < 0 with fcmpg, then x > 0 with fcmpl: each variant sends
                // NaN to the branch that is not taken, so NaN lands on false.
                if double {
                    self.dup2();
                    self.load_double(0.0)?;
                    self.compare(&TypeDesc::double(), true)?;
                } else {
                    self.dup();
                    self.load_float(0.0)?;
                    self.compare(&TypeDesc::float(), true)?;
                }
                self.if_zero(Comparison::Lt, true_with_copy);

                if double {
                    self.load_double(0.0)?;
                    self.compare(&TypeDesc::double(), false)?;
                } else {
                    self.load_float(0.0)?;
                    self.compare(&TypeDesc::float(), false)?;
                }
                self.if_zero(Comparison::Gt, true_case);

                self.load_int(0)?;
                self.branch(done);

                self.bind(true_with_copy)?;
                if double {
                    self.pop2();
                } else {
                    self.pop();
                }
                self.bind(true_case)?;
                self.load_int(1)?;
                self.bind(done)?;
            }
            ValueKind::Reference => {
                return Err(Error::Illegal(
                    "boolean conversion of a reference".to_string(),
                ))
            }
        }

        Ok(())
    }

    /// Box the primitive on the stack into the wrapper of `as_primitive`,
    /// converting between primitives first when they differ.
    fn box_value(&mut self, from: &TypeDesc, as_primitive: &TypeDesc) -> Result<()> {
        self.convert_primitive(from, as_primitive)?;

        let wrapper = wrapper_class(as_primitive)?;
        let wrapper_type = TypeDesc::object(wrapper);
        self.new_object(&wrapper_type)?;

        // Shuffle the fresh instance below the value for the constructor.
        if as_primitive.is_double_word() {
            self.dup_x2();
            self.dup_x2();
            self.pop();
        } else {
            self.dup_x1();
            self.swap();
        }

        self.invoke_constructor(wrapper, &[as_primitive.clone()])
    }

    fn unbox_value(&mut self, from: &TypeDesc, primitive: &TypeDesc) -> Result<()> {
        let wrapper = match from.class_internal_name() {
            Some(name) => name.to_string(),
            None => return Err(Error::Illegal(format!("cannot unbox {}", from))),
        };

        let accessor = match primitive.kind() {
            TypeKind::Boolean => "booleanValue",
            TypeKind::Byte => "byteValue",
            TypeKind::Char => "charValue",
            TypeKind::Short => "shortValue",
            TypeKind::Int => "intValue",
            TypeKind::Long => "longValue",
            TypeKind::Float => "floatValue",
            TypeKind::Double => "doubleValue",
            _ => return Err(Error::Illegal(format!("cannot unbox to {}", primitive))),
        };

        let descriptor = MethodDesc::new(primitive.clone(), Vec::new())?;
        self.invoke_virtual(&wrapper, accessor, &descriptor)
    }
}

const WRAPPERS: &[(&str, &str)] = &[
    ("Z", "java/lang/Boolean"),
    ("B", "java/lang/Byte"),
    ("C", "java/lang/Character"),
    ("S", "java/lang/Short"),
    ("I", "java/lang/Integer"),
    ("J", "java/lang/Long"),
    ("F", "java/lang/Float"),
    ("D", "java/lang/Double"),
];

fn wrapper_class(primitive: &TypeDesc) -> Result<&'static str> {
    for (descriptor, wrapper) in WRAPPERS {
        if primitive.descriptor() == *descriptor {
            return Ok(wrapper);
        }
    }

    Err(Error::Illegal(format!("{} has no wrapper class", primitive)))
}

/// The primitive a wrapper class boxes, if `ty` is a wrapper.
fn wrapper_primitive(ty: &TypeDesc) -> Option<TypeDesc> {
    let name = match ty.kind() {
        TypeKind::Object(name) => name.as_str(),
        _ => return None,
    };

    for (descriptor, wrapper) in WRAPPERS {
        if name == *wrapper {
            return TypeDesc::parse(descriptor).ok();
        }
    }

    None
}

fn is_boxing_supertype(ty: &TypeDesc) -> bool {
    matches!(
        ty.kind(),
        TypeKind::Object(name) if name == "java/lang/Object" || name == "java/lang/Number"
    )
}
