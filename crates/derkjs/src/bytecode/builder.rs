//! Program-image assembly.
//!
//! `ProgramBuilder` is how hosts (and the test suite) produce images: it
//! deduplicates constants and keys, backpatches forward jumps through
//! labels, and tracks function extents so the table's `entry`/`end` bounds
//! are always consistent with the instruction buffer.

use ahash::AHashMap;

use super::program::{
    FuncInfo, ImageConst, LocationEntry, PreloadEntity, PreloadItem, PreloadLoc, Program, ProgramDelta, SourceSpan,
};
use super::{FuncId, Instr, Opcode, Operand};

/// Preload index of the global object, installed by the loader before any
/// image preload. `Operand::Heap(GLOBAL_HANDLE)` pushes it.
pub const GLOBAL_HANDLE: u32 = 0;

/// Forward-reference jump target; bind it once the destination is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Dedup key for the constant pool; floats hash by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Undefined,
    Null,
    Bool(bool),
    Num(u64),
    Str(String),
}

#[derive(Debug, Default)]
pub struct ProgramBuilder {
    instrs: Vec<Instr>,
    consts: Vec<ImageConst>,
    const_index: AHashMap<ConstKey, u32>,
    keys: Vec<String>,
    key_index: AHashMap<String, u32>,
    funcs: Vec<FuncInfo>,
    preloads: Vec<PreloadItem>,
    sources: Vec<String>,
    locations: Vec<LocationEntry>,
    labels: Vec<Option<u32>>,
    patches: Vec<(usize, Label)>,
    current_func: Option<usize>,
    entry: u32,
}

impl ProgramBuilder {
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self::default();
        builder.preloads.push(PreloadItem {
            lexeme: "globalThis".to_owned(),
            entity: PreloadEntity::GlobalObject,
            location: PreloadLoc::HeapObj,
        });
        builder
    }

    // --- constants and keys ---

    fn konst(&mut self, key: ConstKey, value: ImageConst) -> u32 {
        if let Some(&index) = self.const_index.get(&key) {
            return index;
        }
        let index = self.consts.len() as u32;
        self.consts.push(value);
        self.const_index.insert(key, index);
        index
    }

    pub fn num_const(&mut self, n: f64) -> u32 {
        self.konst(ConstKey::Num(n.to_bits()), ImageConst::Num(n))
    }

    pub fn str_const(&mut self, s: &str) -> u32 {
        self.konst(ConstKey::Str(s.to_owned()), ImageConst::Str(s.to_owned()))
    }

    pub fn bool_const(&mut self, b: bool) -> u32 {
        self.konst(ConstKey::Bool(b), ImageConst::Bool(b))
    }

    pub fn undefined_const(&mut self) -> u32 {
        self.konst(ConstKey::Undefined, ImageConst::Undefined)
    }

    pub fn null_const(&mut self) -> u32 {
        self.konst(ConstKey::Null, ImageConst::Null)
    }

    /// Interns `name` into the image's key table.
    pub fn key(&mut self, name: &str) -> u32 {
        if let Some(&index) = self.key_index.get(name) {
            return index;
        }
        let index = self.keys.len() as u32;
        self.keys.push(name.to_owned());
        self.key_index.insert(name.to_owned(), index);
        index
    }

    // --- functions ---

    /// Opens a function-table entry whose body is the instructions emitted
    /// until [`Self::end_function`]. Bodies do not nest.
    pub fn begin_function(&mut self, name: &str, param_count: u8, local_count: u16, capture_slots: u16) -> FuncId {
        assert!(self.current_func.is_none(), "function bodies do not nest");
        let name_const = self.str_const(name);
        let id = FuncId::new(self.funcs.len());
        self.funcs.push(FuncInfo {
            entry: self.instrs.len() as u32,
            end: 0,
            param_count,
            local_count,
            capture_slots,
            name_const,
            span: SourceSpan::default(),
        });
        self.current_func = Some(id.index());
        id
    }

    pub fn end_function(&mut self) {
        let index = self.current_func.take().expect("no open function");
        self.funcs[index].end = self.instrs.len() as u32;
    }

    pub fn set_function_span(&mut self, id: FuncId, span: SourceSpan) {
        self.funcs[id.index()].span = span;
    }

    /// Marks `id` as the top-level thunk the runner starts with. Defaults
    /// to function 0.
    pub fn set_entry(&mut self, id: FuncId) {
        self.entry = id.index() as u32;
    }

    // --- preloads and sources ---

    /// Installs `func` as a global property named `name` at load time.
    pub fn preload_lambda(&mut self, name: &str, func: FuncId) {
        self.preloads.push(PreloadItem {
            lexeme: name.to_owned(),
            entity: PreloadEntity::Lambda {
                func: func.index() as u32,
            },
            location: PreloadLoc::HeapObj,
        });
    }

    /// Installs an empty plain object as a global property named `name`.
    pub fn preload_object(&mut self, name: &str) {
        self.preloads.push(PreloadItem {
            lexeme: name.to_owned(),
            entity: PreloadEntity::PlainObject,
            location: PreloadLoc::HeapObj,
        });
    }

    pub fn source(&mut self, text: &str) -> u32 {
        let index = self.sources.len() as u32;
        self.sources.push(text.to_owned());
        index
    }

    /// Attaches a source span to the next emitted instruction.
    pub fn at(&mut self, source: u32, start: u32, end: u32) {
        self.locations.push(LocationEntry {
            instr: self.instrs.len() as u32,
            span: SourceSpan { source, start, end },
        });
    }

    // --- emission ---

    pub fn emit(&mut self, instr: Instr) -> usize {
        let index = self.instrs.len();
        self.instrs.push(instr);
        index
    }

    pub fn op(&mut self, op: Opcode) -> usize {
        self.emit(Instr::new(op))
    }

    pub fn put_const(&mut self, index: u32) {
        self.emit(Instr::with_a(Opcode::PutConst, Operand::Const(index)));
    }

    /// Shorthand: dedupe a number constant and push it.
    pub fn push_num(&mut self, n: f64) {
        let index = self.num_const(n);
        self.put_const(index);
    }

    /// Shorthand: dedupe a string constant and push it.
    pub fn push_str(&mut self, s: &str) {
        let index = self.str_const(s);
        self.put_const(index);
    }

    pub fn push_undefined(&mut self) {
        let index = self.undefined_const();
        self.put_const(index);
    }

    pub fn put_imm(&mut self, n: i32) {
        self.emit(Instr::with_a(Opcode::PutImm, Operand::Imm(n)));
    }

    pub fn put_heap(&mut self, handle: u32) {
        self.emit(Instr::with_a(Opcode::PutHeap, Operand::Heap(handle)));
    }

    /// Pushes the global object.
    pub fn put_global(&mut self) {
        self.put_heap(GLOBAL_HANDLE);
    }

    pub fn put_key(&mut self, key: u32) {
        self.emit(Instr::with_a(Opcode::PutKey, Operand::Key(key)));
    }

    pub fn get_local(&mut self, slot: u16) {
        self.emit(Instr::with_a(Opcode::GetLocal, Operand::Temp(u32::from(slot))));
    }

    pub fn get_this(&mut self) {
        self.op(Opcode::GetThis);
    }

    pub fn put_local_ref(&mut self, slot: u16) {
        self.emit(Instr::with_a(Opcode::PutLocalRef, Operand::Temp(u32::from(slot))));
    }

    pub fn get_upvalue(&mut self, depth: u16, slot: u16) {
        self.emit(Instr::with_ab(
            Opcode::GetUpvalue,
            Operand::Imm(i32::from(depth)),
            Operand::Imm(i32::from(slot)),
        ));
    }

    pub fn ref_upvalue(&mut self, depth: u16, slot: u16) {
        self.emit(Instr::with_ab(
            Opcode::RefUpvalue,
            Operand::Imm(i32::from(depth)),
            Operand::Imm(i32::from(slot)),
        ));
    }

    /// Property read through a static key.
    pub fn get_prop(&mut self, key: u32) {
        self.emit(Instr::with_a(Opcode::GetProp, Operand::Key(key)));
    }

    /// Property read with the key popped from the stack.
    pub fn get_prop_computed(&mut self) {
        self.op(Opcode::GetProp);
    }

    pub fn set_prop(&mut self, key: u32) {
        self.emit(Instr::with_a(Opcode::SetProp, Operand::Key(key)));
    }

    pub fn set_prop_computed(&mut self) {
        self.op(Opcode::SetProp);
    }

    pub fn ref_prop(&mut self, key: u32) {
        self.emit(Instr::with_a(Opcode::RefProp, Operand::Key(key)));
    }

    /// `delete obj[key]`: pushes the success boolean.
    pub fn delete_prop(&mut self, key: u32) {
        self.emit(Instr::with_a(Opcode::DeleteProp, Operand::Key(key)));
    }

    /// Binds the stack top through the lvalue reference above it.
    pub fn emplace(&mut self) {
        self.op(Opcode::Emplace);
    }

    /// Pops and discards the stack top.
    pub fn discard(&mut self) {
        self.op(Opcode::Drop);
    }

    pub fn throw(&mut self) {
        self.op(Opcode::Throw);
    }

    pub fn halt(&mut self) {
        self.op(Opcode::Halt);
    }

    // --- control flow ---

    #[must_use]
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the next instruction index.
    pub fn bind(&mut self, label: Label) {
        assert!(self.labels[label.0].is_none(), "label bound twice");
        self.labels[label.0] = Some(self.instrs.len() as u32);
    }

    fn emit_branch(&mut self, op: Opcode, label: Label) {
        let index = self.emit(Instr::with_a(op, Operand::Chunk(u32::MAX)));
        self.patches.push((index, label));
    }

    pub fn jump(&mut self, label: Label) {
        self.emit_branch(Opcode::Jump, label);
    }

    pub fn jump_if(&mut self, label: Label) {
        self.emit_branch(Opcode::JumpIf, label);
    }

    pub fn jump_else(&mut self, label: Label) {
        self.emit_branch(Opcode::JumpElse, label);
    }

    // --- construction and calls ---

    pub fn make_lambda(&mut self, func: FuncId, captures: bool) {
        self.emit(Instr::with_ab(
            Opcode::MakeLambda,
            Operand::Imm(func.index() as i32),
            Operand::Imm(i32::from(captures)),
        ));
    }

    pub fn make_array(&mut self, len: u32) {
        self.emit(Instr::with_a(Opcode::MakeArray, Operand::Imm(len as i32)));
    }

    pub fn make_object(&mut self, pairs: u32) {
        self.emit(Instr::with_a(Opcode::MakeObject, Operand::Imm(pairs as i32)));
    }

    pub fn call(&mut self, argc: u8, tail: bool) {
        self.emit(Instr::with_ab(
            Opcode::Call,
            Operand::Imm(i32::from(argc)),
            Operand::Imm(i32::from(tail)),
        ));
    }

    pub fn construct(&mut self, argc: u8) {
        self.emit(Instr::with_a(Opcode::New, Operand::Imm(i32::from(argc))));
    }

    pub fn ret(&mut self) {
        self.op(Opcode::Ret);
    }

    /// Handler marker; a caught error lands in frame slot `slot`.
    pub fn catch_into(&mut self, slot: u16) {
        self.emit(Instr::with_a(Opcode::Catch, Operand::Temp(u32::from(slot))));
    }

    // --- finish ---

    fn patch(&mut self) {
        for &(index, label) in &self.patches {
            let target = self.labels[label.0].expect("unbound label at finish");
            self.instrs[index].a = Operand::Chunk(target);
        }
        self.patches.clear();
    }

    /// Finalizes a standalone image.
    #[must_use]
    pub fn finish(mut self) -> Program {
        assert!(self.current_func.is_none(), "unclosed function at finish");
        self.patch();
        Program {
            instrs: self.instrs,
            consts: self.consts,
            funcs: self.funcs,
            keys: self.keys,
            preloads: self.preloads,
            sources: self.sources,
            locations: self.locations,
            entry: self.entry,
        }
    }

    /// Finalizes an append-only delta whose thunk is `thunk` (a delta-local
    /// function id). Preloads are not representable in deltas.
    #[must_use]
    pub fn finish_delta(mut self, thunk: FuncId) -> ProgramDelta {
        assert!(self.current_func.is_none(), "unclosed function at finish");
        self.patch();
        ProgramDelta {
            instrs: self.instrs,
            consts: self.consts,
            keys: self.keys,
            funcs: self.funcs,
            thunk: thunk.index() as u32,
        }
    }
}
