//! Queue codegen (§4.3): the per-queue data layout, event-bit constants,
//! post/predicate macros, initializer and drain handler. This is the densest
//! part of the generator — the three queue-size strategies (tiny / small /
//! large) each trade a different amount of code size against interrupt
//! latency, and the drain handler is the one place all three are threaded
//! through a single emission routine.

use std::fmt::Write as _;

use crate::model::{Program, Queue, QueueClass};
use crate::weaver;

/// `dios_qsz_<name>`, the state byte and the bitmap reservation.
pub fn generate_queue_udata(queue: &Queue, out: &mut String) {
    writeln!(out, "dios_qsz_{0}\tequ\t{1}", queue.name, queue.events.len()).unwrap();
    writeln!(out, "dios_qstate_{0}\tres\t1", queue.name).unwrap();
    writeln!(out, "dios_q_{0}\tres\t(dios_qsz_{0} + 7) / 8", queue.name).unwrap();
}

/// The `<QueueName>_<EventName>` bit constants, starting at `qid << 8`.
pub fn generate_queue_consts(queue: &Queue, qid: usize, program: &Program, out: &mut String) {
    writeln!(out, "\tcblock\t{qid} << 8\t; Queue event bits").unwrap();
    let names: Vec<String> = queue
        .events
        .iter()
        .map(|&idx| format!("{}_{}", queue.name, program.events.get(idx).name))
        .collect();
    writeln!(out, "\t\t{}", names.join(", ")).unwrap();
    writeln!(out, "\tendc").unwrap();
}

/// `diospost_<queue>`, `diosqsc_<queue>`, and (for unassigned queues)
/// `process_<queue>`.
pub fn generate_queue_macros(queue: &Queue, out: &mut String) {
    let stem = queue.macro_stem();

    writeln!(out, "diospost_{stem}\tmacro\tbit").unwrap();
    writeln!(out, "\tbanksel\tdios_q_{0} + ((bit) + 7) / 8", queue.name).unwrap();
    writeln!(out, "\tbsf\tdios_q_{0} + ((bit) + 7) / 8, (bit) % 8", queue.name).unwrap();
    if queue.is_large() {
        // Interrupt-safe: if the event is drained before we set this, the
        // next drain's state-bit-0 test just costs a few wasted cycles.
        writeln!(out, "\tbanksel\tdios_qstate_{0}", queue.name).unwrap();
        writeln!(out, "\tbsf\tdios_qstate_{0}, 0", queue.name).unwrap();
    }
    writeln!(out, "\tendm").unwrap();

    writeln!(out, "diosqsc_{stem}\tmacro").unwrap();
    match queue.class() {
        QueueClass::Large => {
            writeln!(out, "\tbanksel\tdios_qstate_{0}", queue.name).unwrap();
            writeln!(out, "\tbtfsc\tdios_qstate_{0}, 0", queue.name).unwrap();
        }
        _ if queue.events.len() <= 8 => {
            writeln!(out, "\tbanksel\tdios_q_{0}", queue.name).unwrap();
            writeln!(out, "\tmovf\tdios_q_{0}, F", queue.name).unwrap();
        }
        _ => {
            writeln!(out, "\tclrw").unwrap();
            for i in 0..queue.bitmap_bytes() {
                writeln!(out, "\tbanksel\tdios_q_{0} + {1}", queue.name, i).unwrap();
                writeln!(out, "\tiorwf\tdios_q_{0} + {1}, W", queue.name, i).unwrap();
            }
        }
    }
    writeln!(out, "\tbtfsc\tSTATUS, Z").unwrap();
    writeln!(out, "\tendm").unwrap();

    if queue.phase.is_none() {
        writeln!(out).unwrap();
        writeln!(out, "process_{stem}\tmacro").unwrap();
        writeln!(out, "\tpagesel\thandle_{stem}").unwrap();
        writeln!(out, "\tcall\thandle_{stem}").unwrap();
        writeln!(out, "\tendm").unwrap();
    }
}

/// Zero the state byte and every bitmap byte, in bank-select order.
pub fn generate_queue_init(queue: &Queue, out: &mut String) {
    writeln!(out, "\tbanksel\tdios_qstate_{0}", queue.name).unwrap();
    writeln!(out, "\tclrf\tdios_qstate_{0}", queue.name).unwrap();
    for i in 0..queue.bitmap_bytes() {
        writeln!(out, "\tbanksel\tdios_q_{0} + {1}", queue.name, i).unwrap();
        writeln!(out, "\tclrf\tdios_q_{0} + {1}", queue.name, i).unwrap();
    }
}

/// Emit the drain handler for `queue`, either inline at the point a phase
/// claims it (`start_label` = `phase_<P>`) or at `handle_<queue>` for an
/// unassigned queue. See §4.3 step-by-step algorithm.
pub fn generate_queue_handler(
    queue: &Queue,
    program: &Program,
    start_label: &str,
    out: &mut String,
    impl_out: &mut String,
) {
    let has_prios = program.phase_has_priorities(queue.phase.as_deref());
    let name = &queue.name;
    let qend_label = format!("dios_qend_{name}");

    writeln!(out, "\t; Queue handler for {name}").unwrap();

    match queue.class() {
        QueueClass::Large => {
            writeln!(out, "\tbcf\tdios_qstate_{name}, 1").unwrap();
            writeln!(out, "\tpagesel\t{qend_label}").unwrap();
            writeln!(out, "\tbanksel\tdios_qstate_{name}").unwrap();
            writeln!(out, "\tbtfss\tdios_qstate_{name}, 0").unwrap();
            writeln!(out, "\tgoto\t{qend_label}").unwrap();
            writeln!(out, "\tbcf\tdios_qstate_{name}, 0").unwrap();
            if has_prios {
                // The reference generator's emission here banksels an
                // undefined loop index left over from the scan loop below;
                // the intent is plainly to banksel this queue's own state
                // byte and flag residual work unconditionally.
                writeln!(out, "\tbanksel\tdios_qstate_{name}").unwrap();
                writeln!(out, "\tbsf\tdios_qstate_{name}, 1").unwrap();
            }
        }
        _ => {
            if has_prios {
                writeln!(out, "\tbcf\tdios_qstate_{name}, 1").unwrap();
            }
        }
    }

    let is_tiny = queue.is_tiny();
    for i in 0..queue.bitmap_bytes() {
        let wend_label = format!("dios_w{i}end_{name}");
        if !is_tiny {
            writeln!(out, "\tpagesel\t{wend_label}").unwrap();
            writeln!(out, "\tbanksel\tdios_q_{name} + {i}").unwrap();
            writeln!(out, "\tmovf\tdios_q_{name} + {i}, F").unwrap();
            writeln!(out, "\tbtfsc\tSTATUS, Z").unwrap();
            writeln!(out, "\tgoto\t{wend_label}").unwrap();
            if has_prios {
                writeln!(out, "\tbanksel\tdios_qstate_{name} + {i}").unwrap();
                writeln!(out, "\tbsf\tdios_qstate_{name}, 1").unwrap();
            }
        }

        let end_bit = queue.events.len().min(i * 8 + 8);
        for j in (i * 8)..end_bit {
            let bimpl_label = format!("dios_b{j}impl_{name}");
            let bend_label = format!("dios_b{j}end_{name}");
            writeln!(out, "\tpagesel\t{bimpl_label}").unwrap();
            writeln!(out, "\tbtfsc\tdios_q_{name} + {i}, {}", j - i * 8).unwrap();
            writeln!(out, "\tgoto\t{bimpl_label}").unwrap();

            writeln!(impl_out, "{bimpl_label}:").unwrap();
            writeln!(impl_out, "\tbcf\tdios_q_{name} + {i}, {}", j - i * 8).unwrap();
            let event_idx = queue.events[j];
            let event_name = &program.events.get(event_idx).name;
            weaver::weave(&format!("event_{name}_{event_name}"), program, impl_out, true, true);
            if is_tiny && has_prios {
                writeln!(impl_out, "\tbanksel\tdios_qstate_{name} + {i}").unwrap();
                writeln!(impl_out, "\tbsf\tdios_qstate_{name}, 1").unwrap();
            }
            if j != end_bit - 1 {
                writeln!(impl_out, "\tbanksel\tdios_q_{name} + {i}").unwrap();
            }
            writeln!(impl_out, "\tpagesel\t{bend_label}").unwrap();
            writeln!(impl_out, "\tgoto\t{bend_label}").unwrap();

            writeln!(out, "{bend_label}:").unwrap();
        }

        if !is_tiny {
            if !queue.is_large() && has_prios {
                writeln!(out, "\tbsf\tdios_qstate_{name}, 1").unwrap();
            }
            writeln!(out, "{wend_label}:").unwrap();
        }
    }

    if has_prios {
        if !queue.is_large() {
            writeln!(out, "\tpagesel\t{start_label}").unwrap();
            writeln!(out, "\tbanksel\tdios_qstate_{name}").unwrap();
            writeln!(out, "\tbtfsc\tdios_qstate_{name}, 1").unwrap();
            writeln!(out, "\tgoto\t{start_label}").unwrap();
        } else {
            writeln!(out, "\tpagesel\t{start_label}").unwrap();
            writeln!(out, "\tgoto\t{start_label}").unwrap();
        }
    }

    if queue.is_large() {
        writeln!(out, "{qend_label}:").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventTable;

    fn queue_with_n_events(n: usize, phase: Option<&str>) -> (Program, Queue) {
        let mut program = Program::new("-");
        let mut events = EventTable::new();
        let mut idxs = Vec::new();
        for i in 0..n {
            idxs.push(events.get_or_insert(&format!("E{i}")));
        }
        program.events = events;
        let queue = Queue { name: "QUEUE".into(), events: idxs, phase: phase.map(str::to_string) };
        (program, queue)
    }

    #[test]
    fn queue_consts_emit_unshifted_qid_for_mpasm_to_shift() {
        // The `<< 8` is performed by the assembler, not by us — emitting a
        // pre-shifted qid here would double the shift (e.g. qid=1 would
        // become `256 << 8` instead of `1 << 8`).
        let (program, q) = queue_with_n_events(1, None);
        let mut out = String::new();
        generate_queue_consts(&q, 1, &program, &mut out);
        assert!(out.starts_with("\tcblock\t1 << 8\t; Queue event bits\n"));
        assert!(!out.contains("256"));
    }

    #[test]
    fn bitmap_byte_count_matches_ceil_n_over_8() {
        for (n, expected) in [(0, 0), (1, 1), (8, 1), (9, 2), (16, 2), (17, 3), (24, 3)] {
            let (_, q) = queue_with_n_events(n, None);
            assert_eq!(q.bitmap_bytes(), expected, "n={n}");
        }
    }

    #[test]
    fn post_macro_bit_math_matches_bit_mod_and_div_8() {
        let (_, q) = queue_with_n_events(17, None);
        let mut out = String::new();
        generate_queue_macros(&q, &mut out);
        assert!(out.contains("diospost_queue\tmacro\tbit"));
        assert!(out.contains("((bit) + 7) / 8"));
        assert!(out.contains("(bit) % 8"));
        // Large queue: post also sets state bit 0.
        assert!(out.contains("bsf\tdios_qstate_QUEUE, 0"));
    }

    #[test]
    fn small_queue_le_8_predicate_tests_single_byte() {
        let (_, q) = queue_with_n_events(8, None);
        let mut out = String::new();
        generate_queue_macros(&q, &mut out);
        assert!(out.contains("movf\tdios_q_QUEUE, F"));
    }

    #[test]
    fn small_queue_gt_8_predicate_ors_all_bytes() {
        let (_, q) = queue_with_n_events(12, None);
        let mut out = String::new();
        generate_queue_macros(&q, &mut out);
        assert!(out.contains("clrw"));
        assert!(out.contains("iorwf\tdios_q_QUEUE + 0, W"));
        assert!(out.contains("iorwf\tdios_q_QUEUE + 1, W"));
    }

    #[test]
    fn unassigned_queue_gets_process_dispatch_macro() {
        let (_, q) = queue_with_n_events(2, None);
        let mut out = String::new();
        generate_queue_macros(&q, &mut out);
        assert!(out.contains("process_queue\tmacro"));
        assert!(out.contains("call\thandle_queue"));
    }

    #[test]
    fn assigned_queue_has_no_process_macro() {
        let (_, q) = queue_with_n_events(2, Some("idle"));
        let mut out = String::new();
        generate_queue_macros(&q, &mut out);
        assert!(!out.contains("process_"));
    }

    #[test]
    fn tiny_queue_handler_skips_byte_zero_test() {
        let (program, q) = queue_with_n_events(2, Some("idle"));
        let mut out = String::new();
        let mut impl_out = String::new();
        generate_queue_handler(&q, &program, "phase_idle", &mut out, &mut impl_out);
        assert!(!out.contains("dios_w0end_QUEUE"));
        assert!(out.contains("dios_b0end_QUEUE:"));
        assert!(out.contains("dios_b1end_QUEUE:"));
    }

    #[test]
    fn small_queue_handler_tests_byte_zero_before_scanning() {
        let (program, q) = queue_with_n_events(5, Some("idle"));
        let mut out = String::new();
        let mut impl_out = String::new();
        generate_queue_handler(&q, &program, "phase_idle", &mut out, &mut impl_out);
        assert!(out.contains("dios_w0end_QUEUE:"));
        assert!(out.contains("movf\tdios_q_QUEUE + 0, F"));
    }

    #[test]
    fn large_queue_handler_gates_on_state_bit_0_and_has_qend_label() {
        let (program, q) = queue_with_n_events(17, Some("idle"));
        let mut out = String::new();
        let mut impl_out = String::new();
        generate_queue_handler(&q, &program, "phase_idle", &mut out, &mut impl_out);
        assert!(out.contains("btfss\tdios_qstate_QUEUE, 0"));
        assert!(out.contains("dios_qend_QUEUE:"));
    }

    #[test]
    fn priority_mode_restarts_phase_on_state_bit_1() {
        let mut program = Program::new("-");
        let mut events = EventTable::new();
        let e0 = events.get_or_insert("A");
        program.events = events;
        let q1 = Queue { name: "HI".into(), events: vec![e0], phase: Some("idle".into()) };
        let q2 = Queue { name: "LO".into(), events: vec![e0], phase: Some("idle".into()) };
        program.queues = vec![q1.clone(), q2.clone()];

        let mut out = String::new();
        let mut impl_out = String::new();
        generate_queue_handler(&q1, &program, "phase_idle", &mut out, &mut impl_out);
        assert!(out.contains("btfsc\tdios_qstate_HI, 1"));
        assert!(out.contains("goto\tphase_idle"));
    }

    #[test]
    fn large_priority_queue_restarts_unconditionally() {
        let mut program = Program::new("-");
        let mut events = EventTable::new();
        for i in 0..17 {
            events.get_or_insert(&format!("E{i}"));
        }
        program.events = events;
        let idxs: Vec<usize> = (0..17).collect();
        let q1 = Queue { name: "BIG".into(), events: idxs.clone(), phase: Some("idle".into()) };
        let q2 = Queue { name: "SMALL".into(), events: vec![idxs[0]], phase: Some("idle".into()) };
        program.queues = vec![q1.clone(), q2.clone()];

        let mut out = String::new();
        let mut impl_out = String::new();
        generate_queue_handler(&q1, &program, "phase_idle", &mut out, &mut impl_out);
        // Unconditional restart: no btfsc gating the final goto.
        let goto_pos = out.rfind("goto\tphase_idle").unwrap();
        let preceding = &out[..goto_pos];
        assert!(preceding.trim_end().ends_with("pagesel\tphase_idle"));
    }
}
