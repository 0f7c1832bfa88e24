//! Top-level program emission: preamble, data regions, the reset vector,
//! the ISR prologue/epilogue wired to the `irq` phase, the `_start` entry
//! sequence wiring `init`/`idle`/`sleep`, user phases, and unassigned
//! queues. This ties the module weaver, queue codegen and phase assembler
//! together into the single assembly file described by §6's contract.

use std::fmt::Write as _;

use crate::constants;
use crate::model::Program;
use crate::phase;
use crate::queue;
use crate::weaver;

/// Produce the complete assembly text for `program`. Pure function of the
/// program, per §3's lifecycle note and §5's "generator is purely
/// functional" statement.
pub fn generate(program: &Program) -> String {
    let mut out = String::new();

    writeln!(out, "\t; Generated by diosgen from {:?}. Do not modify directly.", program.srcname)
        .unwrap();

    if !program.includes.is_empty() {
        writeln!(out).unwrap();
        for path in &program.includes {
            writeln!(out, "\tinclude\t\"{path}\"").unwrap();
        }
    }

    writeln!(out).unwrap();
    writeln!(out, "\tudata").unwrap();
    generate_consts(program, &mut out);
    for (qid, q) in program.queues.iter().enumerate() {
        writeln!(out).unwrap();
        queue::generate_queue_udata(q, &mut out);
        queue::generate_queue_consts(q, qid, program, &mut out);
    }

    for c in &program.consts {
        writeln!(out).unwrap();
        constants::generate_constant(c, program, &mut out);
    }

    if !program.modules.is_empty() {
        writeln!(out).unwrap();
        weaver::weave("udata", program, &mut out, true, false);
    }

    writeln!(out).unwrap();
    writeln!(out, "\tudata_shr").unwrap();
    writeln!(out, "dios_irqsave_w\tres\t1").unwrap();
    writeln!(out, "dios_irqsave_status\tres\t1").unwrap();
    writeln!(out, "dios_irqsave_pclath\tres\t1").unwrap();
    weaver::weave("udata_shr", program, &mut out, true, false);

    if !program.modules.is_empty() {
        writeln!(out).unwrap();
        writeln!(out, "\tidata").unwrap();
        weaver::weave("idata", program, &mut out, true, false);
    }

    for q in &program.queues {
        writeln!(out).unwrap();
        queue::generate_queue_macros(q, &mut out);
    }

    if !program.events.is_empty() {
        writeln!(out).unwrap();
        writeln!(out, "diospost\tmacro\tevent").unwrap();
        for (event_idx, event) in program.events.iter().enumerate() {
            writeln!(out, "\tif\tevent == {}", event.name).unwrap();
            for q in &program.queues {
                if !q.events.contains(&event_idx) {
                    continue;
                }
                writeln!(out, "\tdiospost_{}\t{}_{}", q.macro_stem(), q.name, event.name).unwrap();
            }
            writeln!(out, "\tendif").unwrap();
        }
        writeln!(out, "\tendm").unwrap();
    }

    writeln!(out).unwrap();
    writeln!(out, "\tcode").unwrap();

    if !program.modules.is_empty() {
        writeln!(out).unwrap();
        writeln!(out, "\torg\t0x2100").unwrap();
        weaver::weave("eedata", program, &mut out, true, false);
    }

    writeln!(out).unwrap();
    writeln!(out, "\torg\t0").unwrap();
    writeln!(out, "\tpagesel\t_start").unwrap();
    writeln!(out, "\tgoto\t_start").unwrap();

    generate_irq(program, &mut out);

    writeln!(out).unwrap();
    writeln!(out, "_start:").unwrap();
    for q in &program.queues {
        writeln!(out).unwrap();
        queue::generate_queue_init(q, &mut out);
    }

    writeln!(out).unwrap();
    let mut main_impl = String::new();
    phase::generate_phase("init", program, &mut out, &mut main_impl);

    writeln!(out).unwrap();
    phase::generate_phase("idle", program, &mut out, &mut main_impl);

    if program.sleepable {
        writeln!(out).unwrap();
        phase::generate_sleep(program, &mut out, &mut main_impl);
    }

    writeln!(out).unwrap();
    writeln!(out, "\tpagesel\tphase_idle").unwrap();
    writeln!(out, "\tgoto\tphase_idle").unwrap();

    if !main_impl.is_empty() {
        writeln!(out).unwrap();
        out.push_str(&main_impl);
    }

    if !program.modules.is_empty() {
        writeln!(out).unwrap();
        weaver::weave("code", program, &mut out, true, false);
    }

    for p in &program.phases {
        writeln!(out).unwrap();
        let mut phase_impl = String::new();
        phase::generate_phase(&p.name, program, &mut out, &mut phase_impl);
        writeln!(out, "\treturn").unwrap();
        if !phase_impl.is_empty() {
            writeln!(out).unwrap();
            out.push_str(&phase_impl);
        }
    }

    for q in &program.queues {
        if q.phase.is_some() {
            continue;
        }
        writeln!(out).unwrap();
        let start_label = format!("handle_{}", q.macro_stem());
        writeln!(out, "{start_label}:").unwrap();
        let mut queue_impl = String::new();
        queue::generate_queue_handler(q, program, &start_label, &mut out, &mut queue_impl);
        writeln!(out, "\treturn").unwrap();
        if !queue_impl.is_empty() {
            writeln!(out).unwrap();
            out.push_str(&queue_impl);
        }
    }

    writeln!(out).unwrap();
    writeln!(out, "\tend").unwrap();

    out
}

/// The events and queues `cblock`s at the top of the `udata` region.
fn generate_consts(program: &Program, out: &mut String) {
    if !program.events.is_empty() {
        writeln!(out, "\tcblock\t0\t; Events").unwrap();
        let names: Vec<&str> = program.events.iter().map(|e| e.name.as_str()).collect();
        writeln!(out, "\t\t{}", names.join(", ")).unwrap();
        writeln!(out, "\tendc").unwrap();
    }

    if !program.queues.is_empty() {
        if !program.events.is_empty() {
            writeln!(out).unwrap();
        }
        writeln!(out, "\tcblock\t0\t; Queues").unwrap();
        let names: Vec<&str> = program.queues.iter().map(|q| q.name.as_str()).collect();
        writeln!(out, "\t\t{}", names.join(", ")).unwrap();
        writeln!(out, "\tendc").unwrap();
    }
}

/// The ISR at `org 4`: save area prologue, the `irq` phase (weaving plus one
/// flag test/dispatch per IRQ binding), restore epilogue, then the
/// out-of-line per-IRQ implementation stream (which may itself contain a
/// fully woven user phase with its own out-of-line queue handlers).
fn generate_irq(program: &Program, out: &mut String) {
    writeln!(out).unwrap();
    writeln!(out, "\torg\t4").unwrap();
    writeln!(out, "_irq:").unwrap();
    writeln!(out, "\tmovwf\tdios_irqsave_w").unwrap();
    writeln!(out, "\tswapf\tSTATUS, W").unwrap();
    writeln!(out, "\tmovwf\tdios_irqsave_status").unwrap();
    writeln!(out, "\tmovf\tPCLATH, W").unwrap();
    writeln!(out, "\tmovwf\tdios_irqsave_pclath").unwrap();
    writeln!(out).unwrap();

    let mut irq_impl = String::new();
    phase::with_phase("irq", program, out, &mut irq_impl, |out, irq_impl| {
        for irqdef in &program.irqs {
            let impl_label = format!("dios_irqimpl_{}", irqdef.phase);
            writeln!(out, "\tpagesel\t{impl_label}").unwrap();
            writeln!(out, "\tbanksel\t{}", irqdef.flagfile).unwrap();
            writeln!(out, "\tbtfsc\t{}, {}", irqdef.flagfile, irqdef.flagbit).unwrap();
            writeln!(out, "\tgoto\t{impl_label}").unwrap();

            writeln!(irq_impl, "{impl_label}:").unwrap();
            writeln!(irq_impl, "\tbcf\t{}, {}", irqdef.flagfile, irqdef.flagbit).unwrap();

            let mut nested_impl = String::new();
            phase::generate_phase(&irqdef.phase, program, irq_impl, &mut nested_impl);
            writeln!(nested_impl, "\tpagesel\tdios_irqend_{}", irqdef.phase).unwrap();
            writeln!(nested_impl, "\tgoto\tdios_irqend_{}", irqdef.phase).unwrap();
            irq_impl.push_str(&nested_impl);

            writeln!(out, "dios_irqend_{}:", irqdef.phase).unwrap();
        }
    });

    writeln!(out).unwrap();
    writeln!(out, "\tmovf\tdios_irqsave_pclath, W").unwrap();
    writeln!(out, "\tmovwf\tPCLATH").unwrap();
    writeln!(out, "\tswapf\tdios_irqsave_status, W").unwrap();
    writeln!(out, "\tmovwf\tSTATUS").unwrap();
    writeln!(out, "\tswapf\tdios_irqsave_w, F").unwrap();
    writeln!(out, "\tswapf\tdios_irqsave_w, W").unwrap();
    writeln!(out, "\tretfie").unwrap();

    if !irq_impl.is_empty() {
        writeln!(out).unwrap();
        out.push_str(&irq_impl);
    }
}
