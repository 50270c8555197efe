//! Instruction encoding.
//!
//! Instructions are fixed-size records: one opcode plus up to three operands,
//! each tagged with the entity space it addresses. Fixed-width records keep
//! the image instruction-aligned and make runtime-appended deltas trivial to
//! rebase (no byte-level relocation).

pub mod builder;
pub mod program;

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr};

/// Index into the program image's function table. Function 0 is the
/// top-level thunk by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(u32);

impl FuncId {
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("function id overflow"))
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The opcode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    // Stack and locals.
    /// Push a constant-pool entry.
    PutConst,
    /// Push a small number immediate.
    PutImm,
    /// Push a preloaded heap object (operand in the heap-object space).
    PutHeap,
    /// Push an interned key string as a value.
    PutKey,
    /// Push the value of a frame slot (parameter or local).
    GetLocal,
    /// Push the frame's `this` binding.
    GetThis,
    /// Push an lvalue reference to a frame slot.
    PutLocalRef,
    /// Push the value of a captured slot, `depth` parents up.
    GetUpvalue,
    /// Push an lvalue reference to a captured slot.
    RefUpvalue,
    /// Pop object and key, push an lvalue reference to the property.
    RefProp,
    /// Duplicate the top of stack.
    Copy,
    /// Pop and discard the top of stack.
    Drop,

    // Properties.
    /// Push `obj[key]`; key from the `Key` operand or popped when absent.
    GetProp,
    /// `obj[key] = value`; key from the `Key` operand or popped when absent.
    SetProp,
    /// Pop an lvalue reference and bind the value beneath it, which stays on
    /// the stack as the expression result.
    Emplace,
    /// Remove an own property if configurable; pushes the success boolean.
    DeleteProp,

    // Operators.
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Not,
    /// Unary `+`: ToNumber.
    Numify,
    /// Explicit string concatenation.
    Strcat,
    TypeOf,
    Lt,
    Gt,
    Le,
    Ge,
    EqStrict,
    NeStrict,
    EqLoose,
    NeLoose,

    // Control flow. Targets are instruction indices in the code-chunk space.
    Jump,
    /// Jump when truthy, keeping the condition as the expression result;
    /// fall through pops it (short-circuit `||`).
    JumpIf,
    /// Jump when falsy, keeping the condition; fall through pops it
    /// (short-circuit `&&`, `if`, `while`).
    JumpElse,

    // Construction.
    /// Instantiate a function-table entry, optionally closing over the
    /// current frame's capture.
    MakeLambda,
    /// Pop `n` elements into a fresh array.
    MakeArray,
    /// Pop `n` key/value pairs into a fresh plain object.
    MakeObject,

    // Calls.
    /// Call with `argc` arguments over a `[this, callee, args…]` window; a
    /// nonzero second operand requests tail-call frame replacement.
    Call,
    /// Constructor call: same window with the `this` slot replaced by a
    /// fresh object wired to `callee.prototype`.
    New,
    Ret,
    /// Exception handler marker; the operand names the frame slot that
    /// receives the caught error. A no-op in normal flow.
    Catch,
    Throw,
    Halt,
}

/// An operand tagged with its entity space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operand {
    #[default]
    None,
    /// Code address (jump target).
    Chunk(u32),
    /// Small integer immediate (argument counts, slot indices, flags,
    /// function-table indices).
    Imm(i32),
    /// Constant-pool index.
    Const(u32),
    /// Preloaded heap-object index.
    Heap(u32),
    /// Key-table index (interned property name).
    Key(u32),
    /// Frame temp slot.
    Temp(u32),
}

/// One fixed-size instruction record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    pub op: Opcode,
    pub a: Operand,
    pub b: Operand,
    pub c: Operand,
}

impl Instr {
    #[must_use]
    pub fn new(op: Opcode) -> Self {
        Self {
            op,
            a: Operand::None,
            b: Operand::None,
            c: Operand::None,
        }
    }

    #[must_use]
    pub fn with_a(op: Opcode, a: Operand) -> Self {
        Self {
            op,
            a,
            b: Operand::None,
            c: Operand::None,
        }
    }

    #[must_use]
    pub fn with_ab(op: Opcode, a: Operand, b: Operand) -> Self {
        Self {
            op,
            a,
            b,
            c: Operand::None,
        }
    }
}
