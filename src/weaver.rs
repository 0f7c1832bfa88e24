//! The module weaver (§4.2): repeatedly `include`s every module file under a
//! named aspect gate, main pass in declaration order and post pass in
//! reverse, so a single module file can contribute fragments to many
//! different phases and events just by picking which `ifdef` it wraps code
//! in.

use std::fmt::Write as _;

use crate::model::Program;

/// Weave aspect `aspect` into `out`. `main` emits the `diosh_<aspect>`-gated
/// pass in declaration order; `post` emits the `diosph_<aspect>`-gated pass
/// in reverse order. Either may be skipped by the caller; if the program has
/// no modules at all, both are no-ops.
pub fn weave(aspect: &str, program: &Program, out: &mut String, main: bool, post: bool) {
    if program.modules.is_empty() {
        return;
    }

    if main {
        log::trace!("weaving aspect {aspect} (main pass, {} modules)", program.modules.len());
        writeln!(out, "\t#define\tdiosh_{aspect}\t1").unwrap();
        for module in &program.modules {
            writeln!(out, "\tinclude\t\"{}\"", module.path).unwrap();
        }
        writeln!(out, "\t#undefine\tdiosh_{aspect}").unwrap();
    }

    if post {
        log::trace!("weaving aspect {aspect} (post pass, {} modules)", program.modules.len());
        writeln!(out, "\t#define\tdiosph_{aspect}\t1").unwrap();
        for module in program.modules.iter().rev() {
            writeln!(out, "\tinclude\t\"{}\"", module.path).unwrap();
        }
        writeln!(out, "\t#undefine\tdiosph_{aspect}").unwrap();
    }
}
