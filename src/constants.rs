//! The constant reducer (§4.5): merges module-contributed values into a
//! single program-wide constant by the reduction operator the program chose.

use std::fmt::Write as _;

use crate::model::{Constant, Program};

/// Emit `K set e`, then one conditional reassignment block per module that
/// defines `<module>_K`.
pub fn generate_constant(constant: &Constant, program: &Program, out: &mut String) {
    log::trace!("reducing constant {} ({:?})", constant.name, constant.reduction);
    writeln!(out, "{}\tset\t{}", constant.name, constant.reduction.identity()).unwrap();
    for module in &program.modules {
        let modname = module.name();
        writeln!(out, "\tifdef\t{modname}_{}", constant.name).unwrap();
        writeln!(
            out,
            "{0}\tset\t{0} {1} ({2}_{0})",
            constant.name,
            constant.reduction.op_str(),
            modname
        )
        .unwrap();
        writeln!(out, "\tendif").unwrap();
    }
}
