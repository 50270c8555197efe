#![doc = include_str!("../../../README.md")]
mod builtins;
mod bytecode;
mod config;
mod error;
mod heap;
mod intern;
mod io;
mod object;
mod prepare;
mod property;
mod run;
mod value;
mod vm;

pub use crate::{
    bytecode::builder::{Label, ProgramBuilder, GLOBAL_HANDLE},
    bytecode::program::{
        FuncInfo, ImageConst, LocationEntry, PreloadEntity, PreloadItem, PreloadLoc, Program, ProgramDelta,
        SourceSpan,
    },
    bytecode::{FuncId, Instr, Opcode, Operand},
    config::RunConfig,
    error::{CodeLoc, VmErrCode, VmError},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    run::{DerkRun, JsValue, SnippetCompiler},
};
