//! The compiled program image: the single artifact the runtime consumes.
//!
//! An image carries the instruction buffer, the constant pool, the function
//! table, the key table (property names to intern at load), the preload list
//! (heap objects the loader seeds before execution), and the source map.
//! It is immutable after load with one exception: [`ProgramDelta`]s appended
//! by the snippet-recompile path. Deltas only ever append, and existing
//! offsets never shift, so handles and jump targets stay valid for the
//! lifetime of the run.

use serde::{Deserialize, Serialize};
use strum::Display;

use super::{FuncId, Instr, Opcode, Operand};

/// Serializable constant-pool entry. String constants are resolved to
/// interned heap strings by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImageConst {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

/// Source position for functions and instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceSpan {
    pub source: u32,
    pub start: u32,
    pub end: u32,
}

/// Function table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncInfo {
    /// First instruction of the body.
    pub entry: u32,
    /// One past the last instruction of the body; bounds the unwinder's
    /// handler scan.
    pub end: u32,
    pub param_count: u8,
    pub local_count: u16,
    /// Number of slots the frame's capture object carries; 0 means the
    /// function closes over nothing and no capture is allocated.
    pub capture_slots: u16,
    /// Constant-pool index of the function's name (a `Str` entry).
    pub name_const: u32,
    pub span: SourceSpan,
}

/// Where a preload item is installed, per the image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum PreloadLoc {
    Constant,
    HeapObj,
    KeyStr,
    Immediate,
    CodeChunk,
    Temp,
}

/// What the loader materializes for a preload item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreloadEntity {
    /// The global object. Always preload index 0; the loader binds it to
    /// the realm's global rather than allocating a fresh object.
    GlobalObject,
    /// A lambda over a function-table entry, installed as a global property
    /// under the item's lexeme.
    Lambda { func: u32 },
    /// An empty plain object installed as a global property.
    PlainObject,
}

/// `(lexeme, entity, location)` triple from the compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreloadItem {
    pub lexeme: String,
    pub entity: PreloadEntity,
    pub location: PreloadLoc,
}

/// Source-map entry: the location applies from `instr` until the next entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationEntry {
    pub instr: u32,
    pub span: SourceSpan,
}

/// A complete program image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub(crate) instrs: Vec<Instr>,
    pub(crate) consts: Vec<ImageConst>,
    pub(crate) funcs: Vec<FuncInfo>,
    pub(crate) keys: Vec<String>,
    pub(crate) preloads: Vec<PreloadItem>,
    pub(crate) sources: Vec<String>,
    pub(crate) locations: Vec<LocationEntry>,
    /// Function-table index of the top-level thunk.
    pub(crate) entry: u32,
}

impl Program {
    #[must_use]
    pub(crate) fn instr(&self, ip: usize) -> Option<&Instr> {
        self.instrs.get(ip)
    }

    pub(crate) fn func(&self, id: FuncId) -> &FuncInfo {
        self.funcs.get(id.index()).expect("function id out of range")
    }

    #[must_use]
    pub fn func_count(&self) -> usize {
        self.funcs.len()
    }

    #[must_use]
    pub fn instr_count(&self) -> usize {
        self.instrs.len()
    }

    /// The top-level thunk the runner starts with.
    #[must_use]
    pub fn entry_thunk(&self) -> FuncId {
        FuncId::new(self.entry as usize)
    }

    /// Most recent source-map entry at or before `ip`.
    #[must_use]
    pub(crate) fn location_for(&self, ip: usize) -> Option<SourceSpan> {
        let ip = u32::try_from(ip).ok()?;
        self.locations
            .iter()
            .rev()
            .find(|entry| entry.instr <= ip)
            .map(|entry| entry.span)
    }

    #[must_use]
    pub(crate) fn source(&self, index: u32) -> Option<&str> {
        self.sources.get(index as usize).map(String::as_str)
    }

    /// Appends a delta, rebasing its internal references onto this image.
    ///
    /// Returns the id of the delta's top-level thunk. This is the only
    /// mutation of a loaded image: instructions, constants, keys, and
    /// functions are appended and nothing existing moves.
    pub fn apply_delta(&mut self, delta: ProgramDelta) -> FuncId {
        let instr_base = self.instrs.len() as u32;
        let const_base = self.consts.len() as u32;
        let key_base = self.keys.len() as u32;
        let func_base = self.funcs.len() as u32;

        for mut instr in delta.instrs {
            instr.a = rebase_operand(instr.op, instr.a, instr_base, const_base, key_base, func_base);
            instr.b = rebase_operand(instr.op, instr.b, instr_base, const_base, key_base, func_base);
            instr.c = rebase_operand(instr.op, instr.c, instr_base, const_base, key_base, func_base);
            self.instrs.push(instr);
        }
        self.consts.extend(delta.consts);
        self.keys.extend(delta.keys);
        for mut func in delta.funcs {
            func.entry += instr_base;
            func.end += instr_base;
            func.name_const += const_base;
            self.funcs.push(func);
        }
        FuncId::new((func_base + delta.thunk) as usize)
    }
}

impl Program {
    /// Merges a second image (e.g. the polyfill) into this one before load.
    ///
    /// Returns the id of `other`'s top-level thunk. Unlike a delta this
    /// also carries preloads, sources, and locations; `other`'s
    /// global-object preload entries collapse onto this image's handle 0 so
    /// both images share one global.
    pub fn merge(&mut self, other: Self) -> FuncId {
        let instr_base = self.instrs.len() as u32;
        let const_base = self.consts.len() as u32;
        let key_base = self.keys.len() as u32;
        let func_base = self.funcs.len() as u32;
        let source_base = self.sources.len() as u32;

        let mut handle_map: Vec<u32> = Vec::with_capacity(other.preloads.len());
        let mut next = self.preloads.len() as u32;
        for mut item in other.preloads {
            if matches!(item.entity, PreloadEntity::GlobalObject) {
                handle_map.push(0);
            } else {
                if let PreloadEntity::Lambda { func } = &mut item.entity {
                    *func += func_base;
                }
                handle_map.push(next);
                next += 1;
                self.preloads.push(item);
            }
        }

        for mut instr in other.instrs {
            let op = instr.op;
            for operand in [&mut instr.a, &mut instr.b, &mut instr.c] {
                *operand = match *operand {
                    Operand::Heap(index) => {
                        Operand::Heap(handle_map.get(index as usize).copied().unwrap_or(index))
                    }
                    current => rebase_operand(op, current, instr_base, const_base, key_base, func_base),
                };
            }
            self.instrs.push(instr);
        }
        self.consts.extend(other.consts);
        self.keys.extend(other.keys);
        for mut func in other.funcs {
            func.entry += instr_base;
            func.end += instr_base;
            func.name_const += const_base;
            func.span.source += source_base;
            self.funcs.push(func);
        }
        self.sources.extend(other.sources);
        for mut location in other.locations {
            location.instr += instr_base;
            location.span.source += source_base;
            self.locations.push(location);
        }
        FuncId::new((func_base + other.entry) as usize)
    }
}

/// Append-only image extension produced by the snippet-recompile callback.
///
/// All internal references (jump targets, constant and key indices, the
/// `MakeLambda` function index) are delta-local; [`Program::apply_delta`]
/// rebases them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramDelta {
    pub instrs: Vec<Instr>,
    pub consts: Vec<ImageConst>,
    pub keys: Vec<String>,
    pub funcs: Vec<FuncInfo>,
    /// Delta-local index of the top-level thunk among `funcs`.
    pub thunk: u32,
}

fn rebase_operand(
    op: Opcode,
    operand: Operand,
    instr_base: u32,
    const_base: u32,
    key_base: u32,
    func_base: u32,
) -> Operand {
    match operand {
        Operand::Chunk(target) => Operand::Chunk(target + instr_base),
        Operand::Const(index) => Operand::Const(index + const_base),
        Operand::Key(index) => Operand::Key(index + key_base),
        // MakeLambda addresses the function table through an immediate.
        Operand::Imm(index) if op == Opcode::MakeLambda => Operand::Imm(index + func_base as i32),
        // Preloaded heap handles are absolute already, and plain immediates
        // (argc, slots, flags) never move.
        other => other,
    }
}
