//! Backward liveness analysis over the instruction list, dead store
//! detection and the first-fit register allocator that consumes the computed
//! live ranges.

use crate::instruction::list::{ExceptionHandler, LocalVariable};
use crate::instruction::{Instruction, LocalKind};

/// A plain bit set over small indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    pub fn new() -> BitSet {
        BitSet::default()
    }

    pub fn insert(&mut self, bit: usize) -> bool {
        let word = bit / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }

        let mask = 1u64 << (bit % 64);
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    pub fn remove(&mut self, bit: usize) {
        if let Some(word) = self.words.get_mut(bit / 64) {
            *word &= !(1u64 << (bit % 64));
        }
    }

    pub fn contains(&self, bit: usize) -> bool {
        match self.words.get(bit / 64) {
            Some(word) => word & (1u64 << (bit % 64)) != 0,
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Union in `other`, reporting whether anything changed.
    pub fn union_with(&mut self, other: &BitSet) -> bool {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }

        let mut changed = false;
        for (dest, src) in self.words.iter_mut().zip(&other.words) {
            let merged = *dest | *src;
            changed |= merged != *dest;
            *dest = merged;
        }

        changed
    }

    pub fn intersects(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| index * 64 + bit)
        })
    }

    /// Collapse set bits into inclusive index ranges, in ascending order.
    pub fn ranges(&self) -> Vec<(usize, usize)> {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for bit in self.iter() {
            match ranges.last_mut() {
                Some((_, end)) if *end + 1 == bit => *end = bit,
                _ => ranges.push((bit, bit)),
            }
        }

        ranges
    }
}

/// Control flow successors per instruction, including the entry of every
/// handler wrapping it.
pub(crate) fn successors(
    instructions: &[Instruction],
    label_indices: &[usize],
    handlers: &[ExceptionHandler],
) -> Vec<Vec<usize>> {
    let count = instructions.len();
    let mut result = Vec::with_capacity(count);

    for (index, instruction) in instructions.iter().enumerate() {
        let mut next = Vec::new();

        if instruction.falls_through() && index + 1 < count {
            next.push(index + 1);
        }

        let mut targets = Vec::new();
        instruction.branch_targets(&mut targets);
        for target in targets {
            next.push(label_indices[target.0 as usize]);
        }

        for handler in handlers {
            let start = label_indices[handler.start.0 as usize];
            let end = label_indices[handler.end.0 as usize];
            if index >= start && index < end {
                next.push(label_indices[handler.handler.0 as usize]);
            }
        }

        next.sort_unstable();
        next.dedup();
        result.push(next);
    }

    result
}

fn use_def(instruction: &Instruction) -> (Option<u16>, Option<u16>) {
    match instruction {
        Instruction::LocalOp { kind, var } => match kind {
            LocalKind::Load(_) | LocalKind::Ret => (Some(var.0), None),
            LocalKind::Store(_) => (None, Some(var.0)),
        },
        // iinc reads and writes its variable in place.
        Instruction::Iinc { var, .. } => (Some(var.0), Some(var.0)),
        _ => (None, None),
    }
}

pub(crate) struct LivenessResult {
    /// Per instruction: variables live on entry.
    pub live_in: Vec<BitSet>,
    /// Indices of store instructions whose value is never observed.
    pub dead_stores: Vec<usize>,
}

/// Standard backward data flow to a fixed point:
/// `live_out[i] = U live_in[succ]`, `live_in[i] = use[i] | (live_out[i] - def[i])`.
pub(crate) fn analyze(instructions: &[Instruction], successors: &[Vec<usize>]) -> LivenessResult {
    let count = instructions.len();
    let mut live_in = vec![BitSet::new(); count];

    let mut changed = true;
    while changed {
        changed = false;

        for index in (0..count).rev() {
            let mut out = BitSet::new();
            for &succ in &successors[index] {
                out.union_with(&live_in[succ]);
            }

            let (used, defined) = use_def(&instructions[index]);
            if let Some(var) = defined {
                if used != defined {
                    out.remove(var as usize);
                }
            }
            if let Some(var) = used {
                out.insert(var as usize);
            }

            if live_in[index] != out {
                live_in[index] = out;
                changed = true;
            }
        }
    }

    let mut dead_stores = Vec::new();
    for (index, instruction) in instructions.iter().enumerate() {
        if let Instruction::LocalOp {
            kind: LocalKind::Store(_),
            var,
        } = instruction
        {
            let mut live_out = false;
            for &succ in &successors[index] {
                if live_in[succ].contains(var.0 as usize) {
                    live_out = true;
                    break;
                }
            }

            if !live_out {
                dead_stores.push(index);
            }
        }
    }

    LivenessResult {
        live_in,
        dead_stores,
    }
}

/// Project the per-instruction live sets into a per-variable live range.
pub(crate) fn live_ranges(live_in: &[BitSet], var_count: usize) -> Vec<BitSet> {
    let mut ranges = vec![BitSet::new(); var_count];

    for (index, live) in live_in.iter().enumerate() {
        for var in live.iter() {
            ranges[var].insert(index);
        }
    }

    ranges
}

/// First-fit register allocation. Pinned variables keep their registers;
/// the rest are placed at the lowest register whose occupants never overlap
/// them, two consecutive registers for double word types. Returns
/// `max_locals`.
pub(crate) fn allocate(variables: &mut [LocalVariable], param_words: u16) -> u16 {
    let mut max_locals = param_words;

    for index in 0..variables.len() {
        let register = match variables[index].pinned {
            Some(register) => register,
            None => {
                if variables[index].live.is_empty() {
                    // Never live; no register reserved.
                    continue;
                }

                let width = variables[index].ty.word_size();
                let mut candidate = 0u16;
                'search: loop {
                    for other in variables.iter() {
                        let other_register = match (other.pinned, other.register) {
                            (Some(r), _) => r,
                            (None, Some(r)) => r,
                            (None, None) => continue,
                        };

                        let other_width = other.ty.word_size();
                        let disjoint = candidate + width <= other_register
                            || other_register + other_width <= candidate;
                        if disjoint {
                            continue;
                        }

                        // Occupants conflict only while their live ranges
                        // overlap; a parameter register is reusable once the
                        // parameter is dead.
                        if other.live.intersects(&variables[index].live) {
                            candidate += 1;
                            continue 'search;
                        }
                    }

                    break candidate;
                }
            }
        };

        variables[index].register = Some(register);
        max_locals = max_locals.max(register + variables[index].ty.word_size());
    }

    max_locals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitset_basics() {
        let mut set = BitSet::new();
        assert!(set.insert(3));
        assert!(!set.insert(3));
        assert!(set.insert(130));
        assert!(set.contains(3));
        assert!(!set.contains(4));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 130]);

        set.insert(4);
        set.insert(5);
        assert_eq!(set.ranges(), vec![(3, 5), (130, 130)]);
    }

    #[test]
    fn bitset_union() {
        let mut a = BitSet::new();
        a.insert(1);
        let mut b = BitSet::new();
        b.insert(70);

        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert!(a.contains(1));
        assert!(a.contains(70));
        assert!(a.intersects(&b));
    }
}
