//! The per-method instruction list and its lowering pipeline: label
//! resolution, liveness and dead store elimination, register allocation,
//! branch offset fixed point, flow analysis and final byte encoding.

use crate::class::attribute::{
    ExceptionRange, LineNumber, LineNumberTable, LocalVariableEntry, LocalVariableTable,
    StackMapTable,
};
use crate::class::constant::ConstantPool;
use crate::class::version::ClassVersion;
use crate::descriptor::{MethodDesc, TypeDesc};
use crate::error::{Error, Result};
use crate::instruction::liveness::{self, BitSet};
use crate::instruction::{flow, Instruction, Label, LocalKind, VarId};

/// One try/catch region. `start` is inclusive, `end` exclusive; a missing
/// catch type marks a finally handler.
#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: Option<u16>,
}

/// A declared local variable. Parameters arrive pinned to their registers;
/// everything else is placed by the allocator once live ranges are known.
#[derive(Debug, Clone)]
pub struct LocalVariable {
    pub name: Option<String>,
    pub ty: TypeDesc,
    pub(crate) pinned: Option<u16>,
    pub(crate) register: Option<u16>,
    pub(crate) live: BitSet,
}

pub(crate) struct MethodContext<'a> {
    pub class_name: &'a str,
    pub descriptor: &'a MethodDesc,
    pub is_static: bool,
    pub is_constructor: bool,
    pub version: ClassVersion,
    pub debug_info: bool,
}

/// Everything the Code attribute needs, produced by [InstructionList::assemble].
pub(crate) struct AssembledCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionRange>,
    pub stack_map: Option<StackMapTable>,
    pub line_numbers: Option<LineNumberTable>,
    pub local_variables: Option<LocalVariableTable>,
}

#[derive(Debug, Default)]
pub struct InstructionList {
    pub(crate) instructions: Vec<Instruction>,
    /// Label id to the index of its pseudo instruction, once bound.
    labels: Vec<Option<usize>>,
    pub(crate) variables: Vec<LocalVariable>,
    pub(crate) handlers: Vec<ExceptionHandler>,
    /// (instruction index, source line) marks for the LineNumberTable.
    line_marks: Vec<(usize, u16)>,
}

impl InstructionList {
    pub fn new() -> InstructionList {
        InstructionList::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Bind `label` to the current end of the list.
    pub fn bind(&mut self, label: Label) -> Result<()> {
        match self.labels.get_mut(label.0 as usize) {
            Some(binding @ None) => {
                *binding = Some(self.instructions.len());
                self.instructions.push(Instruction::Label(label));
                Ok(())
            }
            Some(Some(_)) => Err(Error::Illegal(format!("label L{} bound twice", label.0))),
            None => Err(Error::Unresolved(format!("unknown label L{}", label.0))),
        }
    }

    pub fn declare(
        &mut self,
        name: Option<String>,
        ty: TypeDesc,
        pinned: Option<u16>,
    ) -> Result<VarId> {
        if ty.is_void() {
            return Err(Error::Illegal("local variable of type void".to_string()));
        }
        if self.variables.len() >= u16::MAX as usize {
            return Err(Error::PoolOverflow("local variable count".to_string()));
        }

        let id = VarId(self.variables.len() as u16);
        self.variables.push(LocalVariable {
            name,
            ty,
            pinned,
            register: None,
            live: BitSet::new(),
        });
        Ok(id)
    }

    pub fn variable_type(&self, var: VarId) -> &TypeDesc {
        &self.variables[var.0 as usize].ty
    }

    pub fn add_exception_handler(&mut self, handler: ExceptionHandler) {
        self.handlers.push(handler);
    }

    /// Attach a source line to the next instruction appended.
    pub fn mark_line(&mut self, line: u16) {
        self.line_marks.push((self.instructions.len(), line));
    }

    fn resolve_labels(&self) -> Result<Vec<usize>> {
        let mut indices = vec![usize::MAX; self.labels.len()];
        for (id, binding) in self.labels.iter().enumerate() {
            if let Some(index) = binding {
                indices[id] = *index;
            }
        }

        let mut referenced = Vec::new();
        for instruction in &self.instructions {
            instruction.branch_targets(&mut referenced);
        }
        for handler in &self.handlers {
            referenced.push(handler.start);
            referenced.push(handler.end);
            referenced.push(handler.handler);
        }

        for label in referenced {
            if indices[label.0 as usize] == usize::MAX {
                return Err(Error::Unresolved(format!(
                    "label L{} is referenced but never bound",
                    label.0
                )));
            }
        }

        Ok(indices)
    }

    /// Iterate locations and lengths until no branch widens and every offset
    /// is stable. A branch only ever grows, so this terminates.
    fn resolve_offsets(
        &mut self,
        label_indices: &[usize],
        registers: &[u16],
    ) -> (Vec<u32>, Vec<u32>, u32) {
        let count = self.instructions.len();
        let mut offsets = vec![0u32; count];
        let mut label_offsets = vec![0u32; self.labels.len()];

        loop {
            let mut offset = 0u32;
            for (index, instruction) in self.instructions.iter().enumerate() {
                offsets[index] = offset;
                offset += instruction.byte_len(offset, registers);
            }

            for (id, binding) in self.labels.iter().enumerate() {
                if let Some(index) = binding {
                    label_offsets[id] = offsets[*index];
                }
            }

            let mut changed = false;
            for (index, instruction) in self.instructions.iter_mut().enumerate() {
                if let Instruction::Branch { target, wide, .. } = instruction {
                    if !*wide {
                        let relative =
                            label_offsets[target.0 as usize] as i64 - offsets[index] as i64;
                        if relative > i16::MAX as i64 || relative < i16::MIN as i64 {
                            trace!("expanding branch at offset {}", offsets[index]);
                            *wide = true;
                            changed = true;
                        }
                    }
                }
            }

            if !changed {
                return (offsets, label_offsets, offset);
            }
        }
    }

    pub(crate) fn assemble(
        &mut self,
        pool: &mut ConstantPool,
        ctx: &MethodContext<'_>,
    ) -> Result<AssembledCode> {
        if self.instructions.is_empty() {
            return Err(Error::Illegal("method body has no instructions".to_string()));
        }

        if ctx.version.requires_stack_maps() {
            for instruction in &self.instructions {
                let is_subroutine_op = matches!(
                    instruction,
                    Instruction::Branch {
                        opcode: super::op::JSR,
                        ..
                    } | Instruction::LocalOp {
                        kind: LocalKind::Ret,
                        ..
                    }
                );
                if is_subroutine_op {
                    return Err(Error::Illegal(format!(
                        "{} requires a class file version below 50.0",
                        instruction
                    )));
                }
            }
        }

        let label_indices = self.resolve_labels()?;

        // Liveness, then dead store elimination before any offsets exist.
        let successors =
            liveness::successors(&self.instructions, &label_indices, &self.handlers);
        let result = liveness::analyze(&self.instructions, &successors);

        for &index in &result.dead_stores {
            let stored_width = match &self.instructions[index] {
                Instruction::LocalOp {
                    kind: LocalKind::Store(value),
                    ..
                } => value.word_size(),
                _ => continue,
            };

            debug!(
                "dead store {} replaced with {}",
                self.instructions[index],
                if stored_width == 2 { "pop2" } else { "pop" }
            );
            self.instructions[index] = Instruction::StackOp(if stored_width == 2 {
                super::op::POP2
            } else {
                super::op::POP
            });
        }

        let ranges = liveness::live_ranges(&result.live_in, self.variables.len());
        for (variable, range) in self.variables.iter_mut().zip(ranges) {
            variable.live = range;
        }

        let receiver_words = if ctx.is_static { 0 } else { 1 };
        let param_words = receiver_words + ctx.descriptor.param_words();
        let max_locals = liveness::allocate(&mut self.variables, param_words);

        let registers: Vec<u16> = self
            .variables
            .iter()
            .map(|variable| variable.register.unwrap_or(0))
            .collect();

        let (offsets, label_offsets, code_length) =
            self.resolve_offsets(&label_indices, &registers);
        if code_length > u16::MAX as u32 {
            return Err(Error::Illegal(format!(
                "method body of {} bytes exceeds the 65535 byte limit",
                code_length
            )));
        }

        let mut live_regs = vec![BitSet::new(); self.instructions.len()];
        for variable in &self.variables {
            if let Some(register) = variable.register {
                for index in variable.live.iter() {
                    live_regs[index].insert(register as usize);
                }
            }
        }

        let (max_stack, frames, entry) = {
            let input = flow::FlowInput {
                instructions: &self.instructions,
                offsets: &offsets,
                label_indices: &label_indices,
                registers: &registers,
                variables: &self.variables,
                handlers: &self.handlers,
                live_regs: &live_regs,
                pool,
                max_locals,
                class_name: ctx.class_name,
                descriptor: ctx.descriptor,
                is_static: ctx.is_static,
                is_constructor: ctx.is_constructor,
            };

            let entry = flow::entry_frame(&input);
            let result = flow::analyze(&input)?;
            (result.max_stack, result.frames, entry)
        };

        let stack_map = if ctx.version.requires_stack_maps() && !frames.is_empty() {
            Some(flow::build_stack_map(&frames, &offsets, &entry, pool)?)
        } else {
            None
        };

        let mut code = Vec::with_capacity(code_length as usize);
        for (index, instruction) in self.instructions.iter().enumerate() {
            let before = code.len();
            instruction.encode(offsets[index], &label_offsets, &registers, &mut code)?;
            debug_assert_eq!(
                (code.len() - before) as u32,
                instruction.byte_len(offsets[index], &registers),
                "encoded length disagrees for {}",
                instruction
            );
        }

        let mut exception_table = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            exception_table.push(ExceptionRange {
                start_pc: label_offsets[handler.start.0 as usize] as u16,
                end_pc: label_offsets[handler.end.0 as usize] as u16,
                handler_pc: label_offsets[handler.handler.0 as usize] as u16,
                catch_type: handler.catch_type.unwrap_or(0),
            });
        }

        let line_numbers = if ctx.debug_info && !self.line_marks.is_empty() {
            let entries = self
                .line_marks
                .iter()
                .map(|(index, line)| LineNumber {
                    start_pc: offsets.get(*index).copied().unwrap_or(code_length) as u16,
                    line_number: *line,
                })
                .collect();
            Some(LineNumberTable { entries })
        } else {
            None
        };

        let local_variables = if ctx.debug_info {
            let mut entries = Vec::new();
            for variable in &self.variables {
                let (name, register) = match (&variable.name, variable.register) {
                    (Some(name), Some(register)) => (name, register),
                    _ => continue,
                };

                let name_index = pool.add_utf8(name)?;
                let descriptor_index = pool.add_utf8(variable.ty.descriptor())?;

                for (first, last) in variable.live.ranges() {
                    let start_pc = offsets[first];
                    let end = match offsets.get(last + 1) {
                        Some(next) => *next,
                        None => code_length,
                    };
                    entries.push(LocalVariableEntry {
                        start_pc: start_pc as u16,
                        length: (end - start_pc) as u16,
                        name_index,
                        descriptor_index,
                        index: register,
                    });
                }
            }

            if entries.is_empty() {
                None
            } else {
                Some(LocalVariableTable { entries })
            }
        } else {
            None
        };

        Ok(AssembledCode {
            max_stack,
            max_locals,
            code,
            exception_table,
            stack_map,
            line_numbers,
            local_variables,
        })
    }
}
