//! The phase assembler (§4.4): wires the module weaver and the per-queue
//! drain handlers together into one phase routine, and derives the `sleep`
//! gate from the program's wake sources and `idle`-phase queues.

use std::fmt::Write as _;

use crate::model::Program;
use crate::queue;
use crate::weaver;

/// Brackets `body` with the aspect-`name` main-pass weave before and the
/// post-pass weave after, mirroring the scoped-acquisition pattern the
/// reference generator uses for a phase's prologue/epilogue (§9).
pub fn with_phase<F>(name: &str, program: &Program, out: &mut String, impl_out: &mut String, body: F)
where
    F: FnOnce(&mut String, &mut String),
{
    let start_label = format!("phase_{name}");
    writeln!(out, "{start_label}:").unwrap();
    weaver::weave(name, program, out, true, false);
    body(out, impl_out);
    weaver::weave(name, program, out, false, true);
}

/// Emit phase `name`: its label, the main-pass weave, every queue owned by
/// this phase (in declaration order, which is priority order), and the
/// post-pass weave.
pub fn generate_phase(name: &str, program: &Program, out: &mut String, impl_out: &mut String) {
    with_phase(name, program, out, impl_out, |out, impl_out| {
        let start_label = format!("phase_{name}");
        for q in &program.queues {
            if q.phase.as_deref() != Some(name) {
                continue;
            }
            writeln!(out).unwrap();
            queue::generate_queue_handler(q, program, &start_label, out, impl_out);
        }
    });
}

/// Emit the `sleep` gate and, when it passes, the `sleep` phase itself
/// (§4.4, §5): any wake source enabled, AND global interrupts enabled, AND
/// no work pending in any `idle`-phase queue.
pub fn generate_sleep(program: &Program, out: &mut String, impl_out: &mut String) {
    if program.wakesrcs.is_empty() {
        // No explicit sources were declared, so `wake always` was used:
        // assume there are wake-up sources enabled.
        writeln!(out, "\tbsf\tSTATUS, C").unwrap();
    } else {
        writeln!(out, "\tbcf\tSTATUS, C").unwrap();
    }

    for w in &program.wakesrcs {
        writeln!(out, "\tbanksel\t{}", w.enfile).unwrap();
        writeln!(out, "\tbtfsc\t{}, {}", w.enfile, w.enbit).unwrap();
        writeln!(out, "\tbsf\tSTATUS, C").unwrap();
    }

    writeln!(out, "\tbanksel\tINTCON").unwrap();
    writeln!(out, "\tbtfss\tINTCON, GIE").unwrap();
    writeln!(out, "\tbcf\tSTATUS, C").unwrap();
    writeln!(out).unwrap();

    for q in &program.queues {
        if q.phase.as_deref() != Some("idle") {
            continue;
        }
        writeln!(out, "\tdiosqsc_{}", q.macro_stem()).unwrap();
        writeln!(out, "\tbcf\tSTATUS, C").unwrap();
    }

    writeln!(out).unwrap();
    writeln!(out, "\tpagesel\tphase_sleep_done").unwrap();
    writeln!(out, "\tbtfss\tSTATUS, C").unwrap();
    writeln!(out, "\tgoto\tphase_sleep_done").unwrap();
    writeln!(out).unwrap();

    with_phase("sleep", program, out, impl_out, |out, _impl_out| {
        writeln!(out, "\tsleep").unwrap();
    });

    writeln!(out, "phase_sleep_done:").unwrap();
}
