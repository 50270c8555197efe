//! The bytecode virtual machine.
//!
//! A loop-and-match dispatcher over fixed-size instructions, with an operand
//! stack, a frame vector, and tail-call frame replacement. Logically each
//! frame moves `ready → running → (returning | throwing)`: entry places the
//! arguments and flips to running, `ret` returns, and a throw hands control
//! to [`Vm::unwind`].
//!
//! Call windows are laid out `[thisArg, callee, arg0 … argN-1]` with `rbsp`
//! naming the stack index of `arg0`; locals sit directly above the arguments
//! and expression temps above those. A return collapses the whole window to
//! the single result value.
//!
//! GC discipline: only [`Vm::alloc`] can trigger a collection, and it runs
//! strictly before the slot is reserved. Handlers must keep every live
//! handle reachable from the operand stack or a frame across any `alloc`
//! call; the idiom is to peek operands in place and truncate after, or to
//! push freshly allocated objects as stack scratch before allocating again.

mod arith;
pub(crate) mod props;

use smallvec::SmallVec;

use crate::bytecode::program::{Program, SourceSpan};
use crate::bytecode::{FuncId, Instr, Opcode, Operand};
use crate::config::RunConfig;
use crate::error::{CodeLoc, RunError, RunResult, VmError};
use crate::heap::{Heap, HeapId};
use crate::intern::{Interner, KeyId, WellKnown};
use crate::io::PrintWriter;
use crate::object::{JsObject, ObjectKind};
use crate::prepare;
use crate::property::Property;
use crate::run::SnippetCompiler;
use crate::value::{SlotRef, Value};

/// Host callable: current VM context, the `this` binding, and the argument
/// window. Returns one value or sets the error flow through `RunError`.
pub(crate) type NativeFn = fn(&mut Vm<'_>, Value, &[Value]) -> RunResult<Value>;

/// Well-known heap handles established by the loader.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Realm {
    pub global: HeapId,
    pub object_proto: HeapId,
    pub function_proto: HeapId,
    pub array_proto: HeapId,
    pub string_proto: HeapId,
    pub number_proto: HeapId,
    pub boolean_proto: HeapId,
    pub error_proto: HeapId,
    pub wk: WellKnown,
}

/// Per-call activation record.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Caller instruction to resume at.
    ret_ip: usize,
    /// Operand-stack index of `arg0`; `this` sits at `rbsp - 2`.
    rbsp: usize,
    func: FuncId,
    callee: HeapId,
    this: Value,
    /// The frame's own capture if the function declares capture slots,
    /// otherwise the environment the callee closed over.
    capture: Option<HeapId>,
    constructor: bool,
}

pub(crate) struct Vm<'a> {
    pub program: Program,
    pub heap: Heap,
    pub interner: Interner,
    pub realm: Realm,
    pub consts: Vec<Value>,
    pub keys: Vec<KeyId>,
    pub handles: Vec<HeapId>,
    pub config: RunConfig,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    ip: usize,
    native_depth: usize,
    pending_error: Option<Value>,
    pub print: &'a mut dyn PrintWriter,
    pub snippet: Option<&'a mut dyn SnippetCompiler>,
}

impl<'a> Vm<'a> {
    /// Loads `program` into a fresh VM: builds the realm, interns the key
    /// table, resolves the constant pool, and installs the preload list.
    pub fn new(
        program: Program,
        config: RunConfig,
        print: &'a mut dyn PrintWriter,
        snippet: Option<&'a mut dyn SnippetCompiler>,
    ) -> Result<Self, VmError> {
        let loaded = prepare::prepare(&program, &config)?;
        Ok(Self {
            program,
            heap: loaded.heap,
            interner: loaded.interner,
            realm: loaded.realm,
            consts: loaded.consts,
            keys: loaded.keys,
            handles: loaded.handles,
            config,
            stack: Vec::with_capacity(64),
            frames: Vec::new(),
            ip: 0,
            native_depth: 0,
            pending_error: None,
            print,
            snippet,
        })
    }

    // --- stack primitives ---

    fn push(&mut self, value: Value) -> RunResult<()> {
        if self.stack.len() >= self.config.stack_size {
            return Err(VmError::bad_operation("operand stack overflow").into());
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> RunResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| VmError::bad_operation("operand stack underflow").into())
    }

    fn peek(&self, depth: usize) -> RunResult<Value> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map(|i| self.stack[i])
            .ok_or_else(|| VmError::bad_operation("operand stack underflow").into())
    }

    fn frame(&self) -> RunResult<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| VmError::bad_operation("no active frame").into())
    }

    // --- operand decoding ---

    fn imm(operand: Operand) -> RunResult<i32> {
        match operand {
            Operand::Imm(n) => Ok(n),
            other => Err(VmError::bad_operation(format!("expected immediate operand, found {other:?}")).into()),
        }
    }

    fn chunk(operand: Operand) -> RunResult<usize> {
        match operand {
            Operand::Chunk(target) => Ok(target as usize),
            other => Err(VmError::bad_operation(format!("expected code operand, found {other:?}")).into()),
        }
    }

    fn temp(operand: Operand) -> RunResult<usize> {
        match operand {
            Operand::Temp(slot) => Ok(slot as usize),
            other => Err(VmError::bad_operation(format!("expected temp operand, found {other:?}")).into()),
        }
    }

    fn const_value(&self, index: u32) -> RunResult<Value> {
        self.consts
            .get(index as usize)
            .copied()
            .ok_or_else(|| VmError::bad_operation(format!("constant {index} out of range")).into())
    }

    fn key_at(&self, index: u32) -> RunResult<KeyId> {
        self.keys
            .get(index as usize)
            .copied()
            .ok_or_else(|| VmError::bad_operation(format!("key {index} out of range")).into())
    }

    fn handle_at(&self, index: u32) -> RunResult<HeapId> {
        self.handles
            .get(index as usize)
            .copied()
            .ok_or_else(|| VmError::bad_operation(format!("heap handle {index} out of range")).into())
    }

    // --- allocation and GC ---

    /// Every root currently live: operand stack (including lvalue slots),
    /// frames, realm, constant pool, preload handles, the intern table, and
    /// the pending error.
    fn roots(&self) -> Vec<HeapId> {
        let mut roots = Vec::with_capacity(self.stack.len() + self.handles.len() + 32);
        for value in &self.stack {
            value.heap_ids(&mut roots);
        }
        for frame in &self.frames {
            roots.push(frame.callee);
            frame.this.heap_ids(&mut roots);
            if let Some(capture) = frame.capture {
                roots.push(capture);
            }
        }
        roots.extend([
            self.realm.global,
            self.realm.object_proto,
            self.realm.function_proto,
            self.realm.array_proto,
            self.realm.string_proto,
            self.realm.number_proto,
            self.realm.boolean_proto,
            self.realm.error_proto,
        ]);
        for value in &self.consts {
            value.heap_ids(&mut roots);
        }
        roots.extend_from_slice(&self.handles);
        roots.extend(self.interner.iter_handles());
        if let Some(error) = &self.pending_error {
            error.heap_ids(&mut roots);
        }
        roots
    }

    /// Allocates through the heap, collecting first once the threshold is
    /// crossed. The collection runs before the slot is reserved, never
    /// mid-allocation.
    pub fn alloc(&mut self, object: JsObject) -> RunResult<HeapId> {
        if self.heap.wants_gc() {
            let roots = self.roots();
            self.heap.collect(roots);
        }
        self.heap.allocate(object).map_err(Into::into)
    }

    /// Allocates a script string.
    pub fn alloc_string(&mut self, content: String) -> RunResult<Value> {
        let proto = Some(self.realm.string_proto);
        Ok(Value::Ref(self.alloc(JsObject::string(proto, content))?))
    }

    /// Allocates a script-visible error object: a plain object on
    /// `Error.prototype` carrying `name` and `message`.
    pub fn new_error(&mut self, name: &str, message: &str) -> RunResult<Value> {
        let obj = self.alloc(JsObject::plain(Some(self.realm.error_proto)))?;
        // Keep the object rooted while its slots are filled in.
        self.push(Value::Ref(obj))?;
        let name_value = self.alloc_string(name.to_owned())?;
        let wk = self.realm.wk;
        self.heap.get_mut(obj).props.insert(wk.name, Property::new(name_value));
        let message_value = self.alloc_string(message.to_owned())?;
        self.heap
            .get_mut(obj)
            .props
            .insert(wk.message, Property::new(message_value));
        self.pop()?;
        Ok(Value::Ref(obj))
    }

    pub fn throw_type_error(&mut self, message: &str) -> RunError {
        match self.new_error("TypeError", message) {
            Ok(error) => RunError::Throw(error),
            Err(fatal) => fatal,
        }
    }

    pub fn throw_range_error(&mut self, message: &str) -> RunError {
        match self.new_error("RangeError", message) {
            Ok(error) => RunError::Throw(error),
            Err(fatal) => fatal,
        }
    }

    /// Source span of the instruction currently executing, if mapped.
    pub fn current_span(&self) -> Option<SourceSpan> {
        self.program.location_for(self.ip.saturating_sub(1))
    }

    /// Scratch rooting for natives: a value pushed here is a GC root until
    /// the matching [`Self::pop_scratch`].
    pub fn push_scratch(&mut self, value: Value) -> RunResult<()> {
        self.push(value)
    }

    pub fn pop_scratch(&mut self) -> RunResult<Value> {
        self.pop()
    }

    /// Coerces an arbitrary value to a property key handle.
    pub fn value_to_key(&mut self, value: Value) -> RunResult<KeyId> {
        let text = value.js_to_string(&self.heap);
        let proto = Some(self.realm.string_proto);
        self.interner.intern(&mut self.heap, proto, &text).map_err(Into::into)
    }

    // --- execution ---

    /// Runs a function-table entry as a top-level thunk with the global
    /// object as `this`. Returns the thunk's result value.
    pub fn run_thunk(&mut self, thunk: FuncId) -> RunResult<Value> {
        self.push(Value::Ref(self.realm.global))?;
        let proto = Some(self.realm.function_proto);
        let lambda = self.alloc(JsObject::lambda(proto, thunk, None))?;
        self.push(Value::Ref(lambda))?;
        let base = self.frames.len();
        if self.enter_call(0, false, false)? {
            self.dispatch(base)?;
        }
        self.pop()
    }

    /// Re-entry point for natives: calls `callee` with an explicit receiver
    /// at a new frame and runs it to completion.
    pub fn call_value(&mut self, callee: Value, this: Value, args: &[Value]) -> RunResult<Value> {
        self.push(this)?;
        self.push(callee)?;
        for &arg in args {
            self.push(arg)?;
        }
        let base = self.frames.len();
        if self.enter_call(args.len(), false, false)? {
            self.dispatch(base)?;
        }
        self.pop()
    }

    /// Instantiates and runs a code chunk with no arguments; used by the
    /// snippet-recompile path.
    pub fn call_chunk(&mut self, func: FuncId) -> RunResult<Value> {
        let proto = Some(self.realm.function_proto);
        let lambda = self.alloc(JsObject::lambda(proto, func, None))?;
        self.push(Value::Ref(lambda))?;
        let result = self.call_value(Value::Ref(lambda), Value::Ref(self.realm.global), &[]);
        let _ = self.pop()?;
        result
    }

    /// The dispatch loop: runs until the frame depth drops back to `base`.
    /// A `Throw` is routed through the unwinder; escaping `base` re-raises
    /// it to the caller (a native boundary or the top-level runner).
    fn dispatch(&mut self, base: usize) -> RunResult<()> {
        while self.frames.len() > base {
            let instr = *self
                .program
                .instr(self.ip)
                .ok_or_else(|| RunError::from(VmError::bad_operation(format!("ip {} out of range", self.ip))))?;
            self.ip += 1;
            match self.step(instr) {
                Ok(()) => {}
                Err(RunError::Throw(error)) => self.unwind(error, base)?,
                Err(RunError::Fatal(error)) => {
                    let error = match (error.location(), self.program.location_for(self.ip.saturating_sub(1))) {
                        (None, Some(span)) => error.with_location(CodeLoc {
                            source: span.source,
                            start: span.start,
                            end: span.end,
                        }),
                        _ => error,
                    };
                    return Err(RunError::Fatal(error));
                }
            }
        }
        Ok(())
    }

    /// Throw/catch across frames.
    ///
    /// The faulting frame is scanned linearly for the next `catch`
    /// instruction at or after the current ip; if none exists the frame is
    /// unwound and the parent continues from its call site. A catching
    /// frame stores the error into the catch's designated slot, resets its
    /// temps, and returns to the running state.
    fn unwind(&mut self, error: Value, base: usize) -> RunResult<()> {
        self.pending_error = Some(error);
        while self.frames.len() > base {
            let frame = *self.frame()?;
            let info = self.program.func(frame.func);
            let end = info.end as usize;
            let mut scan = self.ip;
            let mut handler = None;
            while scan < end {
                if let Some(instr) = self.program.instr(scan) {
                    if instr.op == Opcode::Catch {
                        handler = Some((scan, instr.a));
                        break;
                    }
                }
                scan += 1;
            }
            if let Some((pos, slot_operand)) = handler {
                let slot = Self::temp(slot_operand)?;
                let locals_top = frame.rbsp + usize::from(info.param_count) + usize::from(info.local_count);
                let error = self
                    .pending_error
                    .take()
                    .ok_or_else(|| RunError::from(VmError::bad_operation("unwind without pending error")))?;
                self.stack.truncate(locals_top);
                let index = frame.rbsp + slot;
                if index >= self.stack.len() {
                    return Err(VmError::bad_operation("catch slot out of frame").into());
                }
                self.stack[index] = error;
                self.ip = pos + 1;
                return Ok(());
            }
            // No handler here: unwind this frame and continue in the parent.
            self.frames.pop();
            self.stack.truncate(frame.rbsp - 2);
            self.ip = frame.ret_ip;
        }
        let error = self
            .pending_error
            .take()
            .ok_or_else(|| RunError::from(VmError::bad_operation("unwind without pending error")))?;
        Err(RunError::Throw(error))
    }

    /// Formats the `message` slot of an in-flight error for reporting.
    pub fn error_message(&self, error: Value) -> String {
        if let Value::Ref(id) = error {
            let mut current = Some(id);
            while let Some(cursor) = current {
                let object = self.heap.get(cursor);
                if let Some(prop) = object.props.get(self.realm.wk.message) {
                    return prop.value.js_to_string(&self.heap);
                }
                current = object.proto;
            }
        }
        error.js_to_string(&self.heap)
    }

    // --- calls ---

    /// Establishes a call over the `[this, callee, args…]` window at the
    /// stack top. Returns `true` when a bytecode frame was pushed (or
    /// replaced, for tail calls) and `false` when a native completed the
    /// call inline.
    fn enter_call(&mut self, argc: usize, tail: bool, constructor: bool) -> RunResult<bool> {
        let window = self
            .stack
            .len()
            .checked_sub(argc)
            .filter(|&w| w >= 2)
            .ok_or_else(|| RunError::from(VmError::bad_operation("malformed call window")))?;
        let callee = self.stack[window - 1];
        let Some(callee_id) = callee.as_ref_id() else {
            return Err(VmError::bad_operation(format!(
                "{} is not callable",
                callee.js_to_string(&self.heap)
            ))
            .into());
        };
        if !self.heap.get(callee_id).is_callable() {
            let tag = self.heap.get(callee_id).class_tag();
            return Err(VmError::bad_operation(format!("{tag} object is not callable")).into());
        }

        // Receiver: the constructor protocol installs a fresh object; a
        // plain call takes the pushed receiver, or inherits the caller's
        // `this` when none was provided.
        let this = if constructor {
            let proto = self
                .heap
                .get(callee_id)
                .props
                .get(self.realm.wk.prototype)
                .and_then(|p| p.value.as_ref_id())
                .unwrap_or(self.realm.object_proto);
            let fresh = self.alloc(JsObject::plain(Some(proto)))?;
            self.stack[window - 2] = Value::Ref(fresh);
            Value::Ref(fresh)
        } else {
            match self.stack[window - 2] {
                Value::Undefined => self
                    .frames
                    .last()
                    .map_or(Value::Ref(self.realm.global), |frame| frame.this),
                receiver => receiver,
            }
        };

        match self.heap.get(callee_id).kind {
            ObjectKind::Native { func, .. } => {
                if self.native_depth >= self.config.call_depth_limit {
                    return Err(VmError::bad_operation("maximum call depth exceeded").into());
                }
                let args: SmallVec<[Value; 8]> = self.stack[window..].iter().copied().collect();
                self.native_depth += 1;
                // The window stays on the stack while the native runs so the
                // arguments remain GC roots.
                let result = func(self, this, &args);
                self.native_depth -= 1;
                let result = result?;
                let result = if constructor && !result.is_object(&self.heap) {
                    self.stack[window - 2]
                } else {
                    result
                };
                self.stack.truncate(window - 2);
                self.push(result)?;
                if tail {
                    self.return_with_top()?;
                }
                Ok(false)
            }
            ObjectKind::Lambda { func, capture } => {
                let info = self.program.func(func).clone();
                let params = usize::from(info.param_count);
                // ES5 arity adjustment: missing arguments read as
                // `undefined`, extras are dropped.
                while self.stack.len() - window < params {
                    self.push(Value::Undefined)?;
                }
                self.stack.truncate(window + params);

                let own_capture = if info.capture_slots > 0 {
                    Some(self.alloc(JsObject::capture(capture, usize::from(info.capture_slots)))?)
                } else {
                    capture
                };

                // Tail position replaces the running frame instead of
                // pushing, keeping recursion depth flat. Constructor frames
                // are preserved by falling back to an ordinary call so the
                // implicit-`this` result rule keeps its receiver.
                let tail = tail && self.frames.last().is_some_and(|frame| !frame.constructor);
                if tail {
                    let current = *self.frame()?;
                    let dest = current.rbsp - 2;
                    let src = window - 2;
                    let len = 2 + params;
                    self.stack.copy_within(src..src + len, dest);
                    self.stack.truncate(dest + len);
                    let frame = self
                        .frames
                        .last_mut()
                        .ok_or_else(|| RunError::from(VmError::bad_operation("tail call without frame")))?;
                    frame.func = func;
                    frame.callee = callee_id;
                    frame.this = this;
                    frame.capture = own_capture;
                } else {
                    if self.frames.len() >= self.config.call_depth_limit {
                        return Err(VmError::bad_operation("maximum call depth exceeded").into());
                    }
                    self.frames.push(Frame {
                        ret_ip: self.ip,
                        rbsp: window,
                        func,
                        callee: callee_id,
                        this,
                        capture: own_capture,
                        constructor,
                    });
                }
                for _ in 0..info.local_count {
                    self.push(Value::Undefined)?;
                }
                self.ip = info.entry as usize;
                Ok(true)
            }
            _ => Err(VmError::bad_operation("callee is not callable").into()),
        }
    }

    /// `ret`: collapse the window to the result and resume the caller. For
    /// constructors a non-object result is replaced by the receiver.
    fn return_with_top(&mut self) -> RunResult<()> {
        let mut result = self.pop()?;
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| RunError::from(VmError::bad_operation("return without frame")))?;
        if frame.constructor && !result.is_object(&self.heap) {
            result = frame.this;
        }
        self.stack.truncate(frame.rbsp - 2);
        self.push(result)?;
        self.ip = frame.ret_ip;
        Ok(())
    }

    fn resolve_capture(&self, depth: i32) -> RunResult<HeapId> {
        let frame = self.frame()?;
        let mut current = frame
            .capture
            .ok_or_else(|| RunError::from(VmError::bad_operation("upvalue access without capture")))?;
        for _ in 0..depth {
            match self.heap.get(current).kind {
                ObjectKind::Capture {
                    parent: Some(parent), ..
                } => current = parent,
                _ => return Err(VmError::bad_operation("capture chain too short").into()),
            }
        }
        Ok(current)
    }

    fn capture_slot(&self, capture: HeapId, slot: i32) -> RunResult<Value> {
        match &self.heap.get(capture).kind {
            ObjectKind::Capture { slots, .. } => slots
                .get(slot as usize)
                .copied()
                .ok_or_else(|| VmError::bad_operation(format!("capture slot {slot} out of range")).into()),
            _ => Err(VmError::bad_operation("upvalue target is not a capture").into()),
        }
    }

    fn capture_slot_set(&mut self, capture: HeapId, slot: usize, value: Value) -> RunResult<()> {
        match &mut self.heap.get_mut(capture).kind {
            ObjectKind::Capture { slots, .. } if slot < slots.len() => {
                slots[slot] = value;
                Ok(())
            }
            _ => Err(VmError::bad_operation(format!("capture slot {slot} out of range")).into()),
        }
    }

    // --- the opcode handlers ---

    fn step(&mut self, instr: Instr) -> RunResult<()> {
        match instr.op {
            Opcode::PutConst => {
                let value = match instr.a {
                    Operand::Const(index) => self.const_value(index)?,
                    other => {
                        return Err(VmError::bad_operation(format!("put_const with operand {other:?}")).into());
                    }
                };
                self.push(value)
            }
            Opcode::PutImm => {
                let n = Self::imm(instr.a)?;
                self.push(Value::Number(f64::from(n)))
            }
            Opcode::PutHeap => match instr.a {
                Operand::Heap(index) => {
                    let id = self.handle_at(index)?;
                    self.push(Value::Ref(id))
                }
                other => Err(VmError::bad_operation(format!("put_heap with operand {other:?}")).into()),
            },
            Opcode::PutKey => match instr.a {
                Operand::Key(index) => {
                    let key = self.key_at(index)?;
                    self.push(Value::Ref(key.heap_id()))
                }
                other => Err(VmError::bad_operation(format!("put_key with operand {other:?}")).into()),
            },
            Opcode::GetLocal => {
                let slot = Self::temp(instr.a)?;
                let index = self.frame()?.rbsp + slot;
                let value = self
                    .stack
                    .get(index)
                    .copied()
                    .ok_or_else(|| RunError::from(VmError::bad_operation(format!("local {slot} out of frame"))))?;
                self.push(value)
            }
            Opcode::GetThis => {
                let this = self.frame()?.this;
                self.push(this)
            }
            Opcode::PutLocalRef => {
                let slot = Self::temp(instr.a)?;
                self.push(Value::Slot(SlotRef::Local(slot as u16)))
            }
            Opcode::GetUpvalue => {
                let depth = Self::imm(instr.a)?;
                let slot = Self::imm(instr.b)?;
                let capture = self.resolve_capture(depth)?;
                let value = self.capture_slot(capture, slot)?;
                self.push(value)
            }
            Opcode::RefUpvalue => {
                let depth = Self::imm(instr.a)?;
                let slot = Self::imm(instr.b)?;
                let capture = self.resolve_capture(depth)?;
                self.push(Value::Slot(SlotRef::Upvalue {
                    capture,
                    slot: slot as u16,
                }))
            }
            Opcode::RefProp => {
                let key = match instr.a {
                    Operand::Key(index) => {
                        let key = self.key_at(index)?;
                        let object = self.peek(0)?;
                        let id = self.require_object(object, "reference")?;
                        self.pop()?;
                        return self.push(Value::Slot(SlotRef::Prop { obj: id, key }));
                    }
                    _ => {
                        let key_value = self.peek(0)?;
                        self.value_to_key(key_value)?
                    }
                };
                let object = self.peek(1)?;
                let id = self.require_object(object, "reference")?;
                self.stack.truncate(self.stack.len() - 2);
                self.push(Value::Slot(SlotRef::Prop { obj: id, key }))
            }
            Opcode::Copy => {
                let top = self.peek(0)?;
                self.push(top)
            }
            Opcode::Drop => self.pop().map(|_| ()),

            Opcode::GetProp => {
                let (value, popped) = match instr.a {
                    Operand::Key(index) => {
                        let key = self.key_at(index)?;
                        let object = self.peek(0)?;
                        (self.get_property(object, key)?, 1)
                    }
                    _ => {
                        let key_value = self.peek(0)?;
                        let key = self.value_to_key(key_value)?;
                        let object = self.peek(1)?;
                        (self.get_property(object, key)?, 2)
                    }
                };
                self.stack.truncate(self.stack.len() - popped);
                self.push(value)
            }
            Opcode::SetProp => match instr.a {
                Operand::Key(index) => {
                    let key = self.key_at(index)?;
                    let value = self.peek(0)?;
                    let object = self.peek(1)?;
                    self.set_property(object, key, value)?;
                    self.stack.truncate(self.stack.len() - 2);
                    Ok(())
                }
                _ => {
                    let value = self.peek(0)?;
                    let key_value = self.peek(1)?;
                    let key = self.value_to_key(key_value)?;
                    let object = self.peek(2)?;
                    self.set_property(object, key, value)?;
                    self.stack.truncate(self.stack.len() - 3);
                    Ok(())
                }
            },
            Opcode::DeleteProp => {
                let (object, key, popped) = match instr.a {
                    Operand::Key(index) => (self.peek(0)?, self.key_at(index)?, 1),
                    _ => {
                        let key_value = self.peek(0)?;
                        let key = self.value_to_key(key_value)?;
                        (self.peek(1)?, key, 2)
                    }
                };
                let id = self.require_object(object, "delete")?;
                let removed = self.delete_property(id, key);
                self.stack.truncate(self.stack.len() - popped);
                self.push(Value::Bool(removed))
            }
            Opcode::Emplace => {
                let reference = self.pop()?;
                let value = self.peek(0)?;
                match reference {
                    Value::Slot(SlotRef::Local(slot)) => {
                        let index = self.frame()?.rbsp + usize::from(slot);
                        if index >= self.stack.len() {
                            return Err(VmError::bad_operation(format!("local {slot} out of frame")).into());
                        }
                        self.stack[index] = value;
                        Ok(())
                    }
                    Value::Slot(SlotRef::Upvalue { capture, slot }) => {
                        self.capture_slot_set(capture, usize::from(slot), value)
                    }
                    Value::Slot(SlotRef::Prop { obj, key }) => self.set_property(Value::Ref(obj), key, value),
                    _ => Err(VmError::bad_operation("assignment to non-lvalue").into()),
                }
            }

            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Strcat
            | Opcode::Lt
            | Opcode::Gt
            | Opcode::Le
            | Opcode::Ge
            | Opcode::EqStrict
            | Opcode::NeStrict
            | Opcode::EqLoose
            | Opcode::NeLoose => {
                let rhs = self.peek(0)?;
                let lhs = self.peek(1)?;
                let result = self.binary_op(instr.op, lhs, rhs)?;
                self.stack.truncate(self.stack.len() - 2);
                self.push(result)
            }
            Opcode::Neg | Opcode::Not | Opcode::Numify | Opcode::TypeOf => {
                let operand = self.peek(0)?;
                let result = self.unary_op(instr.op, operand)?;
                self.stack.truncate(self.stack.len() - 1);
                self.push(result)
            }

            Opcode::Jump => {
                self.ip = Self::chunk(instr.a)?;
                Ok(())
            }
            Opcode::JumpIf => {
                let condition = self.peek(0)?;
                if condition.truthy(&self.heap) {
                    // Short-circuit: the kept value is the expression result.
                    self.ip = Self::chunk(instr.a)?;
                } else {
                    self.pop()?;
                }
                Ok(())
            }
            Opcode::JumpElse => {
                let condition = self.peek(0)?;
                if condition.truthy(&self.heap) {
                    self.pop()?;
                } else {
                    self.ip = Self::chunk(instr.a)?;
                }
                Ok(())
            }

            Opcode::MakeLambda => {
                let func = FuncId::new(Self::imm(instr.a)? as usize);
                if func.index() >= self.program.func_count() {
                    return Err(VmError::bad_operation(format!("function {} out of range", func.index())).into());
                }
                let captures = Self::imm(instr.b)? != 0;
                let capture = if captures { self.frame()?.capture } else { None };
                let proto = Some(self.realm.function_proto);
                let lambda = self.alloc(JsObject::lambda(proto, func, capture))?;
                // Root the lambda before allocating its prototype object.
                self.push(Value::Ref(lambda))?;
                let prototype = self.alloc(JsObject::plain(Some(self.realm.object_proto)))?;
                let wk = self.realm.wk;
                self.heap
                    .get_mut(prototype)
                    .props
                    .insert(wk.constructor, Property::new(Value::Ref(lambda)));
                self.heap
                    .get_mut(lambda)
                    .props
                    .insert(wk.prototype, Property::new(Value::Ref(prototype)));
                Ok(())
            }
            Opcode::MakeArray => {
                let len = Self::imm(instr.a)? as usize;
                let start = self
                    .stack
                    .len()
                    .checked_sub(len)
                    .ok_or_else(|| RunError::from(VmError::bad_operation("make_array underflow")))?;
                // Elements stay on the stack (as GC roots) until the array
                // itself is allocated.
                let elements = self.stack[start..].to_vec();
                let proto = Some(self.realm.array_proto);
                let array = self.alloc(JsObject::array(proto, elements))?;
                self.stack.truncate(start);
                self.push(Value::Ref(array))
            }
            Opcode::MakeObject => {
                let pairs = Self::imm(instr.a)? as usize;
                let start = self
                    .stack
                    .len()
                    .checked_sub(pairs * 2)
                    .ok_or_else(|| RunError::from(VmError::bad_operation("make_object underflow")))?;
                let object = self.alloc(JsObject::plain(Some(self.realm.object_proto)))?;
                self.push(Value::Ref(object))?;
                for i in 0..pairs {
                    let key_value = self.stack[start + 2 * i];
                    let value = self.stack[start + 2 * i + 1];
                    let key = self.value_to_key(key_value)?;
                    self.heap.get_mut(object).props.insert(key, Property::new(value));
                }
                self.stack.truncate(start);
                self.push(Value::Ref(object))
            }

            Opcode::Call => {
                let argc = Self::imm(instr.a)? as usize;
                let tail = Self::imm(instr.b)? != 0;
                self.enter_call(argc, tail, false).map(|_| ())
            }
            Opcode::New => {
                let argc = Self::imm(instr.a)? as usize;
                self.enter_call(argc, false, true).map(|_| ())
            }
            Opcode::Ret => self.return_with_top(),
            // A handler marker is inert in normal flow; the unwinder jumps
            // here when a throw reaches this frame.
            Opcode::Catch => Ok(()),
            Opcode::Throw => {
                let error = self.pop()?;
                Err(RunError::Throw(error))
            }
            Opcode::Halt => Err(VmError::abort().into()),
        }
    }

    fn require_object(&self, value: Value, action: &str) -> RunResult<HeapId> {
        match value {
            Value::Ref(id) => Ok(id),
            Value::Undefined => {
                Err(VmError::bad_property_access(format!("cannot take {action} on undefined")).into())
            }
            Value::Null => Err(VmError::bad_property_access(format!("cannot take {action} on null")).into()),
            other => Err(VmError::bad_operation(format!(
                "cannot take {action} on primitive {}",
                other.js_to_string(&self.heap)
            ))
            .into()),
        }
    }
}
