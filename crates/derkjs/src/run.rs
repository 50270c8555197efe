//! Public interface for running compiled DerkJS programs.

use ahash::AHashSet;

use crate::bytecode::program::{Program, ProgramDelta};
use crate::config::RunConfig;
use crate::error::{RunError, VmError};
use crate::heap::HeapId;
use crate::intern::key_str;
use crate::io::PrintWriter;
use crate::object::ObjectKind;
use crate::value::Value;
use crate::vm::Vm;

/// Host-side compiler hook: turns a source fragment into an append-only
/// image delta. Today only the `Error` constructor invokes it, to build a
/// stack-trace thunk at runtime.
pub trait SnippetCompiler {
    fn compile(&mut self, source: &str) -> Result<ProgramDelta, String>;
}

/// Owned, heap-independent result value handed back to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<JsValue>),
    Object(Vec<(String, JsValue)>),
    Function(String),
}

impl std::fmt::Display for JsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&crate::value::number_to_string(*n)),
            Self::Str(s) => f.write_str(s),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Object(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Function(name) => write!(f, "function {name}()"),
        }
    }
}

/// One run of one program: owns the image, the optional polyfill, and the
/// configuration. Every `run` builds a fresh VM; heap, intern table, and
/// globals are never shared between runs.
#[derive(Debug, Clone, Default)]
pub struct DerkRun {
    program: Program,
    polyfill: Option<Program>,
    config: RunConfig,
}

impl DerkRun {
    #[must_use]
    pub fn new(program: Program) -> Self {
        Self {
            program,
            polyfill: None,
            config: RunConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a polyfill image. It is merged ahead of the script (same
    /// append-only path the snippet compiler uses) and its thunk runs first
    /// in the same VM, so its globals are visible to the script.
    #[must_use]
    pub fn with_polyfill(mut self, polyfill: Program) -> Self {
        self.polyfill = Some(polyfill);
        self
    }

    /// Runs to completion. The result is the script thunk's value; any
    /// envelope error or uncaught script error surfaces as `Err`.
    pub fn run(&self, print: &mut impl PrintWriter) -> Result<JsValue, VmError> {
        self.run_inner(print, None)
    }

    /// Runs with a snippet compiler registered for the `Error` constructor.
    pub fn run_with_compiler(
        &self,
        print: &mut impl PrintWriter,
        compiler: &mut dyn SnippetCompiler,
    ) -> Result<JsValue, VmError> {
        self.run_inner(print, Some(compiler))
    }

    fn run_inner<'a>(
        &self,
        print: &'a mut dyn PrintWriter,
        compiler: Option<&'a mut dyn SnippetCompiler>,
    ) -> Result<JsValue, VmError> {
        let (program, thunks) = match &self.polyfill {
            Some(polyfill) => {
                let mut merged = polyfill.clone();
                let polyfill_thunk = merged.entry_thunk();
                let script_thunk = merged.merge(self.program.clone());
                (merged, vec![polyfill_thunk, script_thunk])
            }
            None => {
                let thunk = self.program.entry_thunk();
                (self.program.clone(), vec![thunk])
            }
        };
        if thunks.iter().any(|t| t.index() >= program.func_count()) {
            return Err(VmError::bad_operation("program image entry thunk out of range"));
        }

        let mut vm = Vm::new(program, self.config, print, compiler)?;
        let mut result = Value::Undefined;
        for thunk in thunks {
            match vm.run_thunk(thunk) {
                Ok(value) => result = value,
                Err(RunError::Throw(error)) => {
                    return Err(VmError::uncaught(vm.error_message(error)));
                }
                Err(RunError::Fatal(error)) => return Err(error),
            }
        }
        let mut seen = AHashSet::new();
        Ok(to_js_value(&vm, result, &mut seen))
    }
}

fn to_js_value(vm: &Vm<'_>, value: Value, seen: &mut AHashSet<HeapId>) -> JsValue {
    match value {
        Value::Undefined | Value::Slot(_) => JsValue::Undefined,
        Value::Null => JsValue::Null,
        Value::Bool(b) => JsValue::Bool(b),
        Value::Number(n) => JsValue::Number(n),
        Value::Ref(id) => {
            if !seen.insert(id) {
                return JsValue::Undefined;
            }
            let result = match &vm.heap.get(id).kind {
                ObjectKind::Str(s) => JsValue::Str(s.clone()),
                ObjectKind::Array { elements, .. } => {
                    JsValue::Array(elements.iter().map(|&e| to_js_value(vm, e, seen)).collect())
                }
                ObjectKind::Lambda { func, .. } => {
                    let info = vm.program.func(*func);
                    let name = match vm.consts.get(info.name_const as usize) {
                        Some(Value::Ref(name_id)) => vm.heap.get(*name_id).as_str().unwrap_or("").to_owned(),
                        _ => String::new(),
                    };
                    JsValue::Function(name)
                }
                ObjectKind::Native { name, .. } => JsValue::Function((*name).to_owned()),
                ObjectKind::Plain | ObjectKind::Capture { .. } => {
                    let entries = vm
                        .heap
                        .get(id)
                        .props
                        .iter()
                        .filter(|(_, prop)| prop.enumerable)
                        .map(|(key, prop)| (key_str(&vm.heap, key).to_owned(), prop.value))
                        .collect::<Vec<_>>();
                    JsValue::Object(
                        entries
                            .into_iter()
                            .map(|(name, value)| (name, to_js_value(vm, value, seen)))
                            .collect(),
                    )
                }
            };
            seen.remove(&id);
            result
        }
    }
}
