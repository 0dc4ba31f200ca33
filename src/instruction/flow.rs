//! Flow analysis: abstract interpretation of the instruction stream tracking
//! operand stack and local variable types. Produces `max_stack` and the
//! merged frame at every branch target, from which the StackMapTable is
//! encoded in its smallest legal form.

use hashbrown::HashMap;

use crate::class::attribute::{StackMapFrame, StackMapTable, VerificationTypeInfo};
use crate::class::constant::{Constant, ConstantPool};
use crate::descriptor::{MethodDesc, TypeDesc, TypeKind};
use crate::error::{Error, Result};
use crate::instruction::list::{ExceptionHandler, LocalVariable};
use crate::instruction::liveness::BitSet;
use crate::instruction::{op, Instruction, LocalKind};

/// A verification type before constant pool indices are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VerificationType {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    /// Internal class name, or a full descriptor for array types.
    Object(String),
    /// Produced by `new`; keyed by the offset of the originating
    /// instruction and replaced when the matching `<init>` runs.
    Uninitialized(u32),
}

impl VerificationType {
    pub fn width(&self) -> u16 {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }

    fn of(ty: &TypeDesc) -> VerificationType {
        match ty.kind() {
            TypeKind::Boolean
            | TypeKind::Byte
            | TypeKind::Char
            | TypeKind::Short
            | TypeKind::Int => VerificationType::Integer,
            TypeKind::Long => VerificationType::Long,
            TypeKind::Float => VerificationType::Float,
            TypeKind::Double => VerificationType::Double,
            TypeKind::Void => VerificationType::Top,
            TypeKind::Object(name) => VerificationType::Object(name.clone()),
            TypeKind::Array(_) => VerificationType::Object(ty.descriptor().to_string()),
        }
    }
}

/// Operand stack and locals at one point. Stack entries are one per value;
/// the second slot of a long or double local is an explicit `Top`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Frame {
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

impl Frame {
    fn depth(&self) -> u16 {
        self.stack.iter().map(VerificationType::width).sum()
    }
}

pub(crate) struct FlowInput<'a> {
    pub instructions: &'a [Instruction],
    pub offsets: &'a [u32],
    pub label_indices: &'a [usize],
    pub registers: &'a [u16],
    pub variables: &'a [LocalVariable],
    pub handlers: &'a [ExceptionHandler],
    /// Per instruction: registers that hold a live variable.
    pub live_regs: &'a [BitSet],
    pub pool: &'a ConstantPool,
    pub max_locals: u16,
    pub class_name: &'a str,
    pub descriptor: &'a MethodDesc,
    pub is_static: bool,
    pub is_constructor: bool,
}

pub(crate) struct FlowResult {
    pub max_stack: u16,
    /// Merged state at every branch target and handler entry, by instruction
    /// index, ascending.
    pub frames: Vec<(usize, Frame)>,
}

pub(crate) fn entry_frame(input: &FlowInput) -> Frame {
    let mut locals = vec![VerificationType::Top; input.max_locals as usize];
    let mut register = 0;

    if !input.is_static {
        locals[0] = if input.is_constructor {
            VerificationType::UninitializedThis
        } else {
            VerificationType::Object(input.class_name.to_string())
        };
        register = 1;
    }

    for param in input.descriptor.params() {
        locals[register] = VerificationType::of(param);
        // The second slot of a double word parameter stays Top.
        register += param.word_size() as usize;
    }

    Frame {
        locals,
        stack: Vec::new(),
    }
}

pub(crate) fn analyze(input: &FlowInput) -> Result<FlowResult> {
    let count = input.instructions.len();
    let mut states: Vec<Option<Frame>> = vec![None; count];
    let mut max_stack = 0u16;

    // Frames are required at the targets of branches and at handler entries.
    let mut targets = BitSet::new();
    let mut scratch = Vec::new();
    for instruction in input.instructions {
        scratch.clear();
        instruction.branch_targets(&mut scratch);
        for label in &scratch {
            targets.insert(input.label_indices[label.0 as usize]);
        }
    }
    for handler in input.handlers {
        targets.insert(input.label_indices[handler.handler.0 as usize]);
    }

    let mut jsr_memo: HashMap<usize, i32> = HashMap::new();
    let mut work: Vec<(usize, Frame)> = vec![(0, entry_frame(input))];

    while let Some((start, frame)) = work.pop() {
        let mut index = start;
        let mut frame = frame;

        loop {
            if index >= count {
                warn!("control flow runs off the end of the method");
                break;
            }

            if targets.contains(index) {
                mask_dead_locals(&mut frame, index, input);
            }

            match &mut states[index] {
                Some(existing) => {
                    if !merge_into(existing, &frame, input, index)? {
                        break;
                    }
                    frame = existing.clone();
                }
                None => states[index] = Some(frame.clone()),
            }

            max_stack = max_stack.max(frame.depth());

            // Any covered instruction can transfer to its handlers with the
            // current locals and the caught exception alone on the stack.
            for handler in input.handlers {
                let start_index = input.label_indices[handler.start.0 as usize];
                let end_index = input.label_indices[handler.end.0 as usize];
                if index < start_index || index >= end_index {
                    continue;
                }

                let catch = match handler.catch_type {
                    Some(class_index) => input.pool.class_name(class_index)?.to_string(),
                    None => "java/lang/Throwable".to_string(),
                };

                work.push((
                    input.label_indices[handler.handler.0 as usize],
                    Frame {
                        locals: frame.locals.clone(),
                        stack: vec![VerificationType::Object(catch)],
                    },
                ));
            }

            let instruction = &input.instructions[index];
            match instruction {
                Instruction::Branch {
                    opcode: op::GOTO,
                    target,
                    ..
                } => {
                    index = input.label_indices[target.0 as usize];
                    continue;
                }
                Instruction::Branch {
                    opcode: op::JSR,
                    target,
                    ..
                } => {
                    let entry = input.label_indices[target.0 as usize];

                    let mut subroutine = frame.clone();
                    subroutine.stack.push(VerificationType::Top);
                    max_stack = max_stack.max(subroutine.depth());
                    work.push((entry, subroutine));

                    // The net depth change of the subroutine is memoized per
                    // entry point and applied to the fall through path.
                    let delta = match jsr_memo.get(&entry) {
                        Some(delta) => *delta,
                        None => {
                            let delta = subroutine_delta(input, entry)?;
                            jsr_memo.insert(entry, delta);
                            delta
                        }
                    };
                    adjust_depth(&mut frame, delta)?;

                    index += 1;
                    continue;
                }
                Instruction::Branch { target, .. } => {
                    step(&mut frame, instruction, index, input, &mut max_stack)?;
                    work.push((input.label_indices[target.0 as usize], frame.clone()));
                    index += 1;
                    continue;
                }
                Instruction::Switch(data) => {
                    step(&mut frame, instruction, index, input, &mut max_stack)?;
                    work.push((input.label_indices[data.default.0 as usize], frame.clone()));
                    for (_, label) in &data.cases {
                        work.push((input.label_indices[label.0 as usize], frame.clone()));
                    }
                    break;
                }
                _ => {
                    step(&mut frame, instruction, index, input, &mut max_stack)?;
                    if instruction.falls_through() {
                        index += 1;
                        continue;
                    }
                    break;
                }
            }
        }
    }

    let mut frames = Vec::new();
    for index in targets.iter() {
        if let Some(state) = &states[index] {
            frames.push((index, state.clone()));
        }
    }
    frames.sort_by_key(|(index, _)| *index);

    Ok(FlowResult { max_stack, frames })
}

/// Locals with no live variable at a branch target decay to `Top`.
fn mask_dead_locals(frame: &mut Frame, index: usize, input: &FlowInput) {
    let live = &input.live_regs[index];
    let mut slot = 0;

    while slot < frame.locals.len() {
        let width = frame.locals[slot].width() as usize;
        if !matches!(frame.locals[slot], VerificationType::Top) && !live.contains(slot) {
            frame.locals[slot] = VerificationType::Top;
            if width == 2 && slot + 1 < frame.locals.len() {
                frame.locals[slot + 1] = VerificationType::Top;
            }
        }
        slot += width;
    }
}

fn merge_type(a: &VerificationType, b: &VerificationType) -> VerificationType {
    if a == b {
        return a.clone();
    }

    match (a, b) {
        (VerificationType::Null, VerificationType::Object(x))
        | (VerificationType::Object(x), VerificationType::Null) => {
            VerificationType::Object(x.clone())
        }
        // Without loaded class information the common supertype of two
        // distinct references is taken to be Object.
        (VerificationType::Object(_), VerificationType::Object(_)) => {
            VerificationType::Object("java/lang/Object".to_string())
        }
        _ => VerificationType::Top,
    }
}

/// Merge `incoming` into `existing` at a join. Returns whether `existing`
/// changed; a stack shape mismatch is reported and the incoming path is
/// dropped, leaving the verifier to reject the emitted file.
fn merge_into(
    existing: &mut Frame,
    incoming: &Frame,
    input: &FlowInput,
    index: usize,
) -> Result<bool> {
    if existing.stack.len() != incoming.stack.len() || existing.depth() != incoming.depth() {
        warn!(
            "inconsistent stack depth at {} ({} vs {} words); the emitted file will not verify",
            input.instructions[index],
            existing.depth(),
            incoming.depth()
        );
        return Ok(false);
    }

    let mut changed = false;

    for (slot, value) in existing.locals.iter_mut().zip(&incoming.locals) {
        let merged = merge_type(slot, value);
        if merged != *slot {
            *slot = merged;
            changed = true;
        }
    }

    for (slot, value) in existing.stack.iter_mut().zip(&incoming.stack) {
        let merged = merge_type(slot, value);
        if merged != *slot {
            *slot = merged;
            changed = true;
        }
    }

    Ok(changed)
}

fn push(frame: &mut Frame, value: VerificationType, max_stack: &mut u16) {
    frame.stack.push(value);
    *max_stack = (*max_stack).max(frame.depth());
}

fn pop(frame: &mut Frame, at: &Instruction) -> Result<VerificationType> {
    frame.stack.pop().ok_or_else(|| {
        Error::InconsistentFlow(format!("operand stack underflow at {}", at))
    })
}

/// Pop values totaling exactly `words` stack words.
fn pop_words(frame: &mut Frame, words: u16, at: &Instruction) -> Result<Vec<VerificationType>> {
    let mut removed = Vec::new();
    let mut count = 0;

    while count < words {
        let value = pop(frame, at)?;
        count += value.width();
        removed.push(value);
    }

    if count != words {
        return Err(Error::InconsistentFlow(format!(
            "split of a two word value at {}",
            at
        )));
    }

    Ok(removed)
}

fn adjust_depth(frame: &mut Frame, delta: i32) -> Result<()> {
    if delta >= 0 {
        for _ in 0..delta {
            frame.stack.push(VerificationType::Top);
        }
        return Ok(());
    }

    let mut remaining = -delta;
    while remaining > 0 {
        match frame.stack.pop() {
            Some(value) => remaining -= value.width() as i32,
            None => break,
        }
    }

    Ok(())
}

/// Depth-only scan of a subroutine to find the net stack change between the
/// jsr and the matching ret. Types inside the subroutine are analyzed by the
/// main pass; this only feeds the caller's fall through depth.
fn subroutine_delta(input: &FlowInput, entry: usize) -> Result<i32> {
    let mut visited = BitSet::new();
    let mut work: Vec<(usize, i32)> = vec![(entry, 1)];

    while let Some((mut index, mut depth)) = work.pop() {
        loop {
            if index >= input.instructions.len() || !visited.insert(index) {
                break;
            }

            let instruction = &input.instructions[index];
            match instruction {
                Instruction::LocalOp {
                    kind: LocalKind::Ret,
                    ..
                } => return Ok(depth),
                Instruction::Branch {
                    opcode: op::GOTO,
                    target,
                    ..
                } => {
                    index = input.label_indices[target.0 as usize];
                    continue;
                }
                Instruction::Branch { target, .. } => {
                    depth += instruction.stack_delta(input.pool)? as i32;
                    work.push((input.label_indices[target.0 as usize], depth));
                    index += 1;
                    continue;
                }
                Instruction::Switch(data) => {
                    depth += instruction.stack_delta(input.pool)? as i32;
                    work.push((input.label_indices[data.default.0 as usize], depth));
                    for (_, label) in &data.cases {
                        work.push((input.label_indices[label.0 as usize], depth));
                    }
                    break;
                }
                _ => {
                    depth += instruction.stack_delta(input.pool)? as i32;
                    if instruction.falls_through() {
                        index += 1;
                        continue;
                    }
                    break;
                }
            }
        }
    }

    warn!("subroutine at instruction {} has no ret", entry);
    Ok(0)
}

fn constant_verification(pool: &ConstantPool, index: u16, wide: bool) -> Result<VerificationType> {
    let value = match pool.get(index) {
        Some(value) => value,
        None => return Err(Error::Unresolved(format!("constant pool index {}", index))),
    };

    let vt = match value {
        Constant::Int(_) => VerificationType::Integer,
        Constant::Float(_) => VerificationType::Float,
        Constant::Long(_) => VerificationType::Long,
        Constant::Double(_) => VerificationType::Double,
        Constant::String(_) => VerificationType::Object("java/lang/String".to_string()),
        Constant::Class(_) => VerificationType::Object("java/lang/Class".to_string()),
        x => {
            return Err(Error::Illegal(format!(
                "constant {:?} cannot be loaded onto the stack",
                x
            )))
        }
    };

    if wide != (vt.width() == 2) {
        return Err(Error::Illegal(format!(
            "ldc width does not match constant #{}",
            index
        )));
    }

    Ok(vt)
}

fn field_type(pool: &ConstantPool, index: u16) -> Result<TypeDesc> {
    let (_, _, descriptor) = pool.member_ref(index)?;
    TypeDesc::parse(descriptor)
}

fn array_element(array: &VerificationType, fallback: VerificationType) -> VerificationType {
    if let VerificationType::Object(name) = array {
        if name.starts_with('[') {
            if let Ok(ty) = TypeDesc::parse(name) {
                if let Some(element) = ty.element_type() {
                    return VerificationType::of(element);
                }
            }
        }
    }

    fallback
}

/// Duplicate the top `dup_words` words, re-inserting them `skip_words` words
/// further down. Implements the whole dup family.
fn dup_insert(
    frame: &mut Frame,
    dup_words: u16,
    skip_words: u16,
    at: &Instruction,
    max_stack: &mut u16,
) -> Result<()> {
    let mut duplicated = pop_words(frame, dup_words, at)?;
    let mut skipped = pop_words(frame, skip_words, at)?;

    // pop_words returns values top first; rebuild bottom up.
    duplicated.reverse();
    skipped.reverse();

    frame.stack.extend(duplicated.iter().cloned());
    frame.stack.extend(skipped);
    frame.stack.extend(duplicated);

    *max_stack = (*max_stack).max(frame.depth());
    Ok(())
}

fn step(
    frame: &mut Frame,
    instruction: &Instruction,
    index: usize,
    input: &FlowInput,
    max_stack: &mut u16,
) -> Result<()> {
    match instruction {
        Instruction::Label(_) => {}
        Instruction::Simple(opcode) => {
            simple_step(frame, *opcode, instruction, input, max_stack)?
        }
        Instruction::Immediate { opcode, operand } => match *opcode {
            op::BIPUSH | op::SIPUSH => push(frame, VerificationType::Integer, max_stack),
            op::NEWARRAY => {
                pop(frame, instruction)?;
                let descriptor = match *operand {
                    op::T_BOOLEAN => "[Z",
                    op::T_CHAR => "[C",
                    op::T_FLOAT => "[F",
                    op::T_DOUBLE => "[D",
                    op::T_BYTE => "[B",
                    op::T_SHORT => "[S",
                    op::T_INT => "[I",
                    op::T_LONG => "[J",
                    x => {
                        return Err(Error::Illegal(format!("bad newarray element type {}", x)))
                    }
                };
                push(
                    frame,
                    VerificationType::Object(descriptor.to_string()),
                    max_stack,
                );
            }
            _ => {}
        },
        Instruction::ConstOp { opcode, index: pool_index } => match *opcode {
            op::GETSTATIC => {
                let ty = field_type(input.pool, *pool_index)?;
                push(frame, VerificationType::of(&ty), max_stack);
            }
            op::PUTSTATIC => {
                let ty = field_type(input.pool, *pool_index)?;
                pop_words(frame, ty.word_size(), instruction)?;
            }
            op::GETFIELD => {
                let ty = field_type(input.pool, *pool_index)?;
                pop(frame, instruction)?;
                push(frame, VerificationType::of(&ty), max_stack);
            }
            op::PUTFIELD => {
                let ty = field_type(input.pool, *pool_index)?;
                pop_words(frame, ty.word_size(), instruction)?;
                pop(frame, instruction)?;
            }
            op::CHECKCAST => {
                pop(frame, instruction)?;
                let name = input.pool.class_name(*pool_index)?.to_string();
                push(frame, VerificationType::Object(name), max_stack);
            }
            op::INSTANCEOF => {
                pop(frame, instruction)?;
                push(frame, VerificationType::Integer, max_stack);
            }
            op::ANEWARRAY => {
                pop(frame, instruction)?;
                let name = input.pool.class_name(*pool_index)?;
                let descriptor = if name.starts_with('[') {
                    format!("[{}", name)
                } else {
                    format!("[L{};", name)
                };
                push(frame, VerificationType::Object(descriptor), max_stack);
            }
            x => {
                return Err(Error::Illegal(format!(
                    "unexpected constant operand opcode {}",
                    op::mnemonic(x)
                )))
            }
        },
        Instruction::LoadConst { index: pool_index, wide } => {
            let value = constant_verification(input.pool, *pool_index, *wide)?;
            push(frame, value, max_stack);
        }
        Instruction::Branch { opcode, .. } => match *opcode {
            op::IF_ICMPEQ..=op::IF_ACMPNE => {
                pop(frame, instruction)?;
                pop(frame, instruction)?;
            }
            op::GOTO | op::JSR => {}
            _ => {
                pop(frame, instruction)?;
            }
        },
        Instruction::LocalOp { kind, var } => {
            let register = input.registers[var.0 as usize] as usize;
            let variable = &input.variables[var.0 as usize];

            match kind {
                LocalKind::Load(_) => {
                    let value = match &frame.locals[register] {
                        VerificationType::Top => {
                            warn!(
                                "{} reads a local that is not definitely assigned",
                                instruction
                            );
                            VerificationType::of(&variable.ty)
                        }
                        value => value.clone(),
                    };
                    push(frame, value, max_stack);
                }
                LocalKind::Store(_) => {
                    let value = pop(frame, instruction)?;
                    let width = variable.ty.word_size();
                    if value.width() > width {
                        return Err(Error::Illegal(format!(
                            "store of a wider type into a narrower variable at {}",
                            instruction
                        )));
                    }

                    // Clobbering the second half of a two word value
                    // invalidates the whole value.
                    if register > 0 && frame.locals[register - 1].width() == 2 {
                        frame.locals[register - 1] = VerificationType::Top;
                    }

                    frame.locals[register] = value;
                    if width == 2 && register + 1 < frame.locals.len() {
                        frame.locals[register + 1] = VerificationType::Top;
                    }
                }
                LocalKind::Ret => {}
            }
        }
        Instruction::Iinc { var, .. } => {
            let register = input.registers[var.0 as usize] as usize;
            if frame.locals[register] != VerificationType::Integer {
                warn!("iinc of a non-integer local at {}", instruction);
            }
        }
        Instruction::Switch(_) => {
            pop(frame, instruction)?;
        }
        Instruction::StackOp(opcode) => match *opcode {
            op::POP => {
                let value = pop(frame, instruction)?;
                if value.width() != 1 {
                    warn!("pop of a two word value at {}", instruction);
                }
            }
            op::POP2 => {
                pop_words(frame, 2, instruction)?;
            }
            op::DUP => dup_insert(frame, 1, 0, instruction, max_stack)?,
            op::DUP_X1 => dup_insert(frame, 1, 1, instruction, max_stack)?,
            op::DUP_X2 => dup_insert(frame, 1, 2, instruction, max_stack)?,
            op::DUP2 => dup_insert(frame, 2, 0, instruction, max_stack)?,
            op::DUP2_X1 => dup_insert(frame, 2, 1, instruction, max_stack)?,
            op::DUP2_X2 => dup_insert(frame, 2, 2, instruction, max_stack)?,
            op::SWAP => {
                let a = pop(frame, instruction)?;
                let b = pop(frame, instruction)?;
                if a.width() != 1 || b.width() != 1 {
                    warn!("swap of a two word value at {}", instruction);
                }
                push(frame, a, max_stack);
                push(frame, b, max_stack);
            }
            x => {
                return Err(Error::Illegal(format!(
                    "unexpected stack opcode {}",
                    op::mnemonic(x)
                )))
            }
        },
        Instruction::Invoke {
            opcode,
            index: pool_index,
            ..
        } => {
            let (class, name, descriptor) = input.pool.member_ref(*pool_index)?;
            let class = class.to_string();
            let name = name.to_string();
            let descriptor = MethodDesc::parse(descriptor)?;

            for param in descriptor.params().iter().rev() {
                pop_words(frame, param.word_size(), instruction)?;
            }

            if *opcode != op::INVOKESTATIC {
                let receiver = pop(frame, instruction)?;

                if *opcode == op::INVOKESPECIAL && name == "<init>" {
                    match receiver {
                        VerificationType::Uninitialized(offset) => {
                            let initialized = VerificationType::Object(class);
                            replace_all(frame, &VerificationType::Uninitialized(offset), &initialized);
                        }
                        VerificationType::UninitializedThis => {
                            let initialized =
                                VerificationType::Object(input.class_name.to_string());
                            replace_all(frame, &VerificationType::UninitializedThis, &initialized);
                        }
                        _ => warn!("<init> invoked on an initialized value at {}", instruction),
                    }
                }
            }

            if !descriptor.returns_void() {
                push(frame, VerificationType::of(descriptor.returns()), max_stack);
            }
        }
        Instruction::New { .. } => {
            push(
                frame,
                VerificationType::Uninitialized(input.offsets[index]),
                max_stack,
            );
        }
        Instruction::MultiNewArray {
            index: pool_index,
            dims,
        } => {
            for _ in 0..*dims {
                pop(frame, instruction)?;
            }
            let name = input.pool.class_name(*pool_index)?.to_string();
            push(frame, VerificationType::Object(name), max_stack);
        }
    }

    Ok(())
}

fn replace_all(frame: &mut Frame, from: &VerificationType, to: &VerificationType) {
    for slot in frame.locals.iter_mut().chain(frame.stack.iter_mut()) {
        if slot == from {
            *slot = to.clone();
        }
    }
}

fn simple_step(
    frame: &mut Frame,
    opcode: u8,
    at: &Instruction,
    input: &FlowInput,
    max_stack: &mut u16,
) -> Result<()> {
    use VerificationType::*;

    match opcode {
        op::NOP => {}
        op::ACONST_NULL => push(frame, Null, max_stack),
        op::ICONST_M1..=op::ICONST_5 => push(frame, Integer, max_stack),
        op::LCONST_0 | op::LCONST_1 => push(frame, Long, max_stack),
        op::FCONST_0..=op::FCONST_2 => push(frame, Float, max_stack),
        op::DCONST_0 | op::DCONST_1 => push(frame, Double, max_stack),

        op::IALOAD | op::BALOAD | op::CALOAD | op::SALOAD => {
            pop(frame, at)?;
            pop(frame, at)?;
            push(frame, Integer, max_stack);
        }
        op::LALOAD => {
            pop(frame, at)?;
            pop(frame, at)?;
            push(frame, Long, max_stack);
        }
        op::FALOAD => {
            pop(frame, at)?;
            pop(frame, at)?;
            push(frame, Float, max_stack);
        }
        op::DALOAD => {
            pop(frame, at)?;
            pop(frame, at)?;
            push(frame, Double, max_stack);
        }
        op::AALOAD => {
            pop(frame, at)?;
            let array = pop(frame, at)?;
            let element = array_element(&array, Object("java/lang/Object".to_string()));
            push(frame, element, max_stack);
        }

        op::IASTORE..=op::SASTORE => {
            // value, index, arrayref
            pop(frame, at)?;
            pop(frame, at)?;
            pop(frame, at)?;
        }

        op::IADD | op::ISUB | op::IMUL | op::IDIV | op::IREM | op::ISHL | op::ISHR
        | op::IUSHR | op::IAND | op::IOR | op::IXOR => {
            pop(frame, at)?;
            pop(frame, at)?;
            push(frame, Integer, max_stack);
        }
        op::LADD | op::LSUB | op::LMUL | op::LDIV | op::LREM | op::LAND | op::LOR | op::LXOR => {
            pop(frame, at)?;
            pop(frame, at)?;
            push(frame, Long, max_stack);
        }
        op::LSHL | op::LSHR | op::LUSHR => {
            // shift amount is an int
            pop(frame, at)?;
            pop(frame, at)?;
            push(frame, Long, max_stack);
        }
        op::FADD | op::FSUB | op::FMUL | op::FDIV | op::FREM => {
            pop(frame, at)?;
            pop(frame, at)?;
            push(frame, Float, max_stack);
        }
        op::DADD | op::DSUB | op::DMUL | op::DDIV | op::DREM => {
            pop(frame, at)?;
            pop(frame, at)?;
            push(frame, Double, max_stack);
        }
        op::INEG | op::LNEG | op::FNEG | op::DNEG => {}

        op::I2L | op::F2L | op::D2L => convert(frame, at, Long, max_stack)?,
        op::I2F | op::L2F | op::D2F => convert(frame, at, Float, max_stack)?,
        op::I2D | op::L2D | op::F2D => convert(frame, at, Double, max_stack)?,
        op::L2I | op::F2I | op::D2I | op::I2B | op::I2C | op::I2S => {
            convert(frame, at, Integer, max_stack)?
        }

        op::LCMP | op::FCMPL | op::FCMPG | op::DCMPL | op::DCMPG => {
            pop(frame, at)?;
            pop(frame, at)?;
            push(frame, Integer, max_stack);
        }

        op::IRETURN | op::LRETURN | op::FRETURN | op::DRETURN | op::ARETURN => {
            pop(frame, at)?;
        }
        op::RETURN => {}

        op::ARRAYLENGTH => {
            pop(frame, at)?;
            push(frame, Integer, max_stack);
        }
        op::ATHROW | op::MONITORENTER | op::MONITOREXIT => {
            pop(frame, at)?;
        }

        x => {
            // Unknown simple opcode: fall back to the declared stack delta.
            warn!("untyped stack transfer for {}", op::mnemonic(x));
            let delta = at.stack_delta(input.pool)? as i32;
            adjust_depth(frame, delta)?;
            *max_stack = (*max_stack).max(frame.depth());
        }
    }

    Ok(())
}

fn convert(
    frame: &mut Frame,
    at: &Instruction,
    to: VerificationType,
    max_stack: &mut u16,
) -> Result<()> {
    pop(frame, at)?;
    push(frame, to, max_stack);
    Ok(())
}

/// Encode the computed frames as a StackMapTable, choosing the smallest
/// legal encoding for each frame relative to its predecessor.
pub(crate) fn build_stack_map(
    frames: &[(usize, Frame)],
    offsets: &[u32],
    entry: &Frame,
    pool: &mut ConstantPool,
) -> Result<StackMapTable> {
    // Adjacent labels share an offset; only the later state (which has seen
    // every inbound edge) gets a frame, since offsets must be unique.
    let mut distinct: Vec<&(usize, Frame)> = Vec::with_capacity(frames.len());
    for frame in frames {
        if let Some(last) = distinct.last() {
            if offsets[last.0] == offsets[frame.0] {
                distinct.pop();
            }
        }
        distinct.push(frame);
    }

    let mut encoded = Vec::with_capacity(distinct.len());
    let mut previous_locals = compress_locals(&entry.locals, pool)?;
    let mut previous_offset: Option<u32> = None;

    for (index, frame) in distinct {
        let offset = offsets[*index];
        let delta = match previous_offset {
            None => offset,
            Some(prev) => offset - prev - 1,
        };
        let delta = delta as u16;

        let locals = compress_locals(&frame.locals, pool)?;
        let stack = frame
            .stack
            .iter()
            .map(|vt| file_verification(vt, pool))
            .collect::<Result<Vec<_>>>()?;

        let frame = if locals == previous_locals && stack.is_empty() {
            if delta <= 63 {
                StackMapFrame::SameFrame(delta as u8)
            } else {
                StackMapFrame::SameFrameExtended {
                    offset_delta: delta,
                }
            }
        } else if locals == previous_locals && stack.len() == 1 {
            if delta <= 63 {
                StackMapFrame::SameLocals1StackItemFrame {
                    frame_type: 64 + delta as u8,
                    stack: stack[0],
                }
            } else {
                StackMapFrame::SameLocals1StackItemFrameExtended {
                    offset_delta: delta,
                    stack: stack[0],
                }
            }
        } else if stack.is_empty()
            && locals.len() < previous_locals.len()
            && previous_locals.len() - locals.len() <= 3
            && previous_locals[..locals.len()] == locals[..]
        {
            StackMapFrame::ChopFrame {
                frame_type: 251 - (previous_locals.len() - locals.len()) as u8,
                offset_delta: delta,
            }
        } else if stack.is_empty()
            && locals.len() > previous_locals.len()
            && locals.len() - previous_locals.len() <= 3
            && locals[..previous_locals.len()] == previous_locals[..]
        {
            StackMapFrame::AppendFrame {
                frame_type: 251 + (locals.len() - previous_locals.len()) as u8,
                offset_delta: delta,
                locals: locals[previous_locals.len()..].to_vec(),
            }
        } else {
            StackMapFrame::FullFrame {
                offset_delta: delta,
                locals: locals.clone(),
                stack,
            }
        };

        encoded.push(frame);
        previous_locals = locals;
        previous_offset = Some(offset);
    }

    Ok(StackMapTable { frames: encoded })
}

/// Fold the slot array into the frame form: two word types appear once, and
/// trailing Top entries are omitted.
fn compress_locals(
    slots: &[VerificationType],
    pool: &mut ConstantPool,
) -> Result<Vec<VerificationTypeInfo>> {
    let mut compressed = Vec::new();
    let mut slot = 0;

    while slot < slots.len() {
        let value = &slots[slot];
        compressed.push(file_verification(value, pool)?);
        slot += value.width() as usize;
    }

    while matches!(compressed.last(), Some(VerificationTypeInfo::Top)) {
        compressed.pop();
    }

    Ok(compressed)
}

fn file_verification(
    value: &VerificationType,
    pool: &mut ConstantPool,
) -> Result<VerificationTypeInfo> {
    Ok(match value {
        VerificationType::Top => VerificationTypeInfo::Top,
        VerificationType::Integer => VerificationTypeInfo::Integer,
        VerificationType::Float => VerificationTypeInfo::Float,
        VerificationType::Long => VerificationTypeInfo::Long,
        VerificationType::Double => VerificationTypeInfo::Double,
        VerificationType::Null => VerificationTypeInfo::Null,
        VerificationType::UninitializedThis => VerificationTypeInfo::UninitializedThis,
        VerificationType::Object(name) => VerificationTypeInfo::Object {
            class_index: pool.add_class_name(name)?,
        },
        VerificationType::Uninitialized(offset) => VerificationTypeInfo::Uninitialized {
            offset: *offset as u16,
        },
    })
}
