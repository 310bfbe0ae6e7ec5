//! SMT-LIB2 rendering.
//!
//! Deterministic text for every term shape, plus whole-script emission for
//! a set of assertions: `(set-logic QF_BV)`, one `declare-fun` per free
//! variable in name order, the assertions in input order, `(check-sat)`,
//! `(exit)`. `declare-fun` rather than `declare-const` because STP does not
//! know the latter.

use std::collections::HashSet;
use std::fmt::Write;

use crate::manager::AstManager;
use crate::term::{BinaryOp, TermId, TermKind, UnaryOp};

impl UnaryOp {
    fn smt2_name(self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::BvNot => "bvnot",
            Self::BvNeg => "bvneg",
            Self::Assert => "assert",
        }
    }
}

impl BinaryOp {
    fn smt2_name(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Eq => "=",
            Self::BvAnd => "bvand",
            Self::BvOr => "bvor",
            Self::BvXor => "bvxor",
            Self::BvAdd => "bvadd",
            Self::BvSub => "bvsub",
            Self::BvMul => "bvmul",
            Self::BvConcat => "concat",
            Self::BvShl => "bvshl",
            Self::BvLshr => "bvlshr",
            Self::BvUlt => "bvult",
            Self::BvUle => "bvule",
            Self::BvUgt => "bvugt",
            Self::BvUge => "bvuge",
            Self::BvSlt => "bvslt",
            Self::BvSle => "bvsle",
            Self::BvSgt => "bvsgt",
            Self::BvSge => "bvsge",
        }
    }
}

impl AstManager {
    /// SMT-LIB2 text of a term.
    #[must_use]
    pub fn to_smt2(&self, t: TermId) -> String {
        let mut out = String::new();
        self.render(t, &mut out);
        out
    }

    fn render(&self, t: TermId, out: &mut String) {
        match self.kind(t) {
            TermKind::BoolConst(v) => out.push_str(if *v { "true" } else { "false" }),
            TermKind::Const { value, width } => {
                if *width == 32 {
                    // 32-bit integer constants print as decimal raw bits.
                    let _ = write!(out, "{value}");
                } else {
                    out.push_str("#b");
                    for bit in (0..*width).rev() {
                        out.push(if value & (1 << bit) != 0 { '1' } else { '0' });
                    }
                }
            }
            TermKind::Var { name, .. } => out.push_str(name),
            TermKind::Unary { op, arg } => {
                let _ = write!(out, "({} ", op.smt2_name());
                self.render(*arg, out);
                out.push(')');
            }
            TermKind::Binary { op, lhs, rhs } => {
                let _ = write!(out, "({} ", op.smt2_name());
                self.render(*lhs, out);
                out.push(' ');
                self.render(*rhs, out);
                out.push(')');
            }
            TermKind::Extract { arg, hi, lo } => {
                let _ = write!(out, "((_ extract {hi} {lo}) ");
                self.render(*arg, out);
                out.push(')');
            }
        }
    }

    /// Free variables reachable from the given roots, deduplicated and in
    /// name order: `(name, width)` pairs ready for declaration.
    #[must_use]
    pub fn free_variables(&self, roots: &[TermId]) -> Vec<(String, u8)> {
        let mut seen_terms = HashSet::new();
        let mut seen_names = HashSet::new();
        let mut vars = Vec::new();
        let mut stack: Vec<TermId> = roots.to_vec();

        while let Some(t) = stack.pop() {
            if !seen_terms.insert(t) {
                continue;
            }
            match self.kind(t) {
                TermKind::Var { name, width } => {
                    if seen_names.insert(name.clone()) {
                        vars.push((name.clone(), *width));
                    }
                }
                TermKind::Unary { arg, .. } => stack.push(*arg),
                TermKind::Binary { lhs, rhs, .. } => {
                    stack.push(*lhs);
                    stack.push(*rhs);
                }
                TermKind::Extract { arg, .. } => stack.push(*arg),
                TermKind::BoolConst(_) | TermKind::Const { .. } => {}
            }
        }

        vars.sort();
        vars
    }

    /// Full query script for a set of assertions.
    ///
    /// Assertions not already wrapped by [`AstManager::assert_term`] are
    /// wrapped here.
    #[must_use]
    pub fn smt2_script(&self, assertions: &[TermId]) -> String {
        let mut out = String::from("(set-logic QF_BV)\n");

        for (name, width) in self.free_variables(assertions) {
            let _ = writeln!(out, "(declare-fun {name} () (_ BitVec {width}))");
        }

        for &a in assertions {
            if matches!(
                self.kind(a),
                TermKind::Unary {
                    op: UnaryOp::Assert,
                    ..
                }
            ) {
                self.render(a, &mut out);
                out.push('\n');
            } else {
                out.push_str("(assert ");
                self.render(a, &mut out);
                out.push_str(")\n");
            }
        }

        out.push_str("(check-sat)\n(exit)\n");
        out
    }
}
