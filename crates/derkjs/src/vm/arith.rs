//! Operator evaluation: the arithmetic, comparison, and unary opcodes.
//!
//! Numeric coercion follows ES5: `+` concatenates when either operand is an
//! object (objects reach their primitive form through the string hook in
//! this subset), relational operators compare code units when both sides
//! are strings and numbers otherwise, and division by zero follows IEEE.

use super::Vm;
use crate::bytecode::Opcode;
use crate::error::{RunResult, VmError};
use crate::object::ObjectKind;
use crate::value::Value;

impl Vm<'_> {
    pub(super) fn binary_op(&mut self, op: Opcode, lhs: Value, rhs: Value) -> RunResult<Value> {
        match op {
            Opcode::Add => self.add_values(lhs, rhs),
            Opcode::Sub => Ok(Value::Number(lhs.to_number(&self.heap) - rhs.to_number(&self.heap))),
            Opcode::Mul => Ok(Value::Number(lhs.to_number(&self.heap) * rhs.to_number(&self.heap))),
            // IEEE division: signed infinity or NaN on zero divisors.
            Opcode::Div => Ok(Value::Number(lhs.to_number(&self.heap) / rhs.to_number(&self.heap))),
            // ES5 %: truncated division remainder, sign of the dividend.
            Opcode::Mod => Ok(Value::Number(lhs.to_number(&self.heap) % rhs.to_number(&self.heap))),
            Opcode::Strcat => {
                let text = format!("{}{}", lhs.js_to_string(&self.heap), rhs.js_to_string(&self.heap));
                self.alloc_string(text)
            }
            Opcode::Lt => Ok(Value::Bool(self.relational(lhs, rhs, |o| o == std::cmp::Ordering::Less))),
            Opcode::Gt => Ok(Value::Bool(self.relational(lhs, rhs, |o| o == std::cmp::Ordering::Greater))),
            Opcode::Le => Ok(Value::Bool(self.relational(lhs, rhs, |o| o != std::cmp::Ordering::Greater))),
            Opcode::Ge => Ok(Value::Bool(self.relational(lhs, rhs, |o| o != std::cmp::Ordering::Less))),
            Opcode::EqStrict => Ok(Value::Bool(lhs.strict_eq(rhs, &self.heap))),
            Opcode::NeStrict => Ok(Value::Bool(!lhs.strict_eq(rhs, &self.heap))),
            Opcode::EqLoose => Ok(Value::Bool(lhs.loose_eq(rhs, &self.heap))),
            Opcode::NeLoose => Ok(Value::Bool(!lhs.loose_eq(rhs, &self.heap))),
            other => Err(VmError::bad_operation(format!("{other} is not a binary operator")).into()),
        }
    }

    pub(super) fn unary_op(&mut self, op: Opcode, operand: Value) -> RunResult<Value> {
        match op {
            Opcode::Neg => Ok(Value::Number(-operand.to_number(&self.heap))),
            Opcode::Not => Ok(Value::Bool(!operand.truthy(&self.heap))),
            Opcode::Numify => Ok(Value::Number(operand.to_number(&self.heap))),
            Opcode::TypeOf => {
                let tag = operand.type_of(&self.heap);
                self.alloc_string(tag.to_owned())
            }
            other => Err(VmError::bad_operation(format!("{other} is not a unary operator")).into()),
        }
    }

    /// ES5 `+`: concatenation when either side reaches a string primitive,
    /// numeric addition otherwise. Objects in this subset have no `valueOf`,
    /// so every reference coerces through its string hook.
    fn add_values(&mut self, lhs: Value, rhs: Value) -> RunResult<Value> {
        if matches!(lhs, Value::Ref(_)) || matches!(rhs, Value::Ref(_)) {
            let text = format!("{}{}", lhs.js_to_string(&self.heap), rhs.js_to_string(&self.heap));
            return self.alloc_string(text);
        }
        Ok(Value::Number(lhs.to_number(&self.heap) + rhs.to_number(&self.heap)))
    }

    /// Relational comparison: lexicographic on code units when both sides
    /// are strings, numeric with NaN-poisoning otherwise.
    fn relational(&self, lhs: Value, rhs: Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> bool {
        if let (Value::Ref(a), Value::Ref(b)) = (lhs, rhs) {
            if let (ObjectKind::Str(s1), ObjectKind::Str(s2)) = (&self.heap.get(a).kind, &self.heap.get(b).kind) {
                return accept(s1.as_str().cmp(s2.as_str()));
            }
        }
        let a = lhs.to_number(&self.heap);
        let b = rhs.to_number(&self.heap);
        match a.partial_cmp(&b) {
            Some(ordering) => accept(ordering),
            None => false,
        }
    }
}
