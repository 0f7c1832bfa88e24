//! Reads a line-oriented description into a [`Program`](crate::model::Program),
//! enforcing the cross-entity validity rules of §3 after the line-by-line
//! pass completes.

use std::io::BufRead;

use crate::error::{DiosError, Result};
use crate::lexer::{line_regex, split_args, split_line};
use crate::model::{
    BUILTIN_PHASES, Constant, IrqBinding, Phase, Program, Queue, Reduction, WakeSource,
};

/// Parse a description from any line source (a file, a string's lines, ...).
/// `path` is used only for diagnostics.
pub fn parse_lines<R: BufRead>(reader: R, path: &str) -> Result<Program> {
    let mut program = Program::new(path);
    let mut saw_dios = false;
    let mut wake_always = false;
    let line_re = line_regex();
    let mut last_line = 0usize;

    for (lno0, line) in reader.lines().enumerate() {
        let lno = lno0 + 1;
        last_line = lno;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let parts = split_line(&line_re, &line, path, lno)?;
        let Some(op) = parts.op else { continue };

        let args = match parts.args {
            Some(raw) => split_args(path, lno, raw)?,
            None => Vec::new(),
        };

        match op {
            "dios" => saw_dios = true,
            "include" => {
                expect_args(path, lno, "include", &args, 1)?;
                program.includes.push(unquote(&args[0]));
            }
            "module" => {
                expect_args(path, lno, "module", &args, 1)?;
                program.modules.push(crate::model::Module { path: unquote(&args[0]) });
            }
            "evqueue" => {
                if args.len() != 1 && args.len() != 2 {
                    return Err(DiosError::parse(
                        path,
                        lno,
                        format!("Expected one or two arguments to 'evqueue': {args:?}"),
                    ));
                }
                program.queues.push(Queue {
                    name: args[0].clone(),
                    events: Vec::new(),
                    phase: args.get(1).cloned(),
                });
            }
            "event" => {
                expect_args(path, lno, "event", &args, 1)?;
                let idx = program.events.get_or_insert(&args[0]);
                let Some(queue) = program.queues.last_mut() else {
                    return Err(DiosError::parse(
                        path,
                        lno,
                        "'event' with no preceding 'evqueue'",
                    ));
                };
                queue.events.push(idx);
            }
            "phase" => {
                expect_args(path, lno, "phase", &args, 1)?;
                program.phases.push(Phase { name: args[0].clone() });
            }
            "irq" => {
                if args.len() != 3 {
                    return Err(DiosError::parse(
                        path,
                        lno,
                        format!("Expected three arguments to 'irq': {args:?}"),
                    ));
                }
                if !args[0].starts_with("irq_") {
                    return Err(DiosError::parse(
                        path,
                        lno,
                        format!("Phase names used for IRQ must start with 'irq_': {}", args[0]),
                    ));
                }
                program.irqs.push(IrqBinding {
                    phase: args[0].clone(),
                    flagfile: args[1].clone(),
                    flagbit: args[2].clone(),
                });
            }
            "wake" => {
                program.sleepable = true;
                if args.len() == 1 && args[0] == "always" {
                    wake_always = true;
                } else if args.len() == 2 {
                    program.wakesrcs.push(WakeSource { enfile: args[0].clone(), enbit: args[1].clone() });
                } else {
                    return Err(DiosError::parse(
                        path,
                        lno,
                        format!("Expected two arguments to 'wake': {args:?}"),
                    ));
                }
            }
            "const" => {
                expect_args(path, lno, "const", &args, 2)?;
                let Some(reduction) = Reduction::from_keyword(&args[1]) else {
                    return Err(DiosError::parse(
                        path,
                        lno,
                        format!("Unknown const reduction: {}", args[1]),
                    ));
                };
                program.consts.push(Constant { name: args[0].clone(), reduction });
            }
            _ => {
                return Err(DiosError::parse(path, lno, format!("Unknown events op: {line}")));
            }
        }
    }

    if !saw_dios {
        return Err(DiosError::parse(path, last_line, "No 'dios' marker found in file"));
    }

    if wake_always && !program.wakesrcs.is_empty() {
        return Err(DiosError::parse(
            path,
            last_line,
            format!("Both 'wake always' and {} explicit source(s) specified", program.wakesrcs.len()),
        ));
    }

    validate(&program, path)?;

    Ok(program)
}

fn expect_args(path: &str, lno: usize, op: &str, args: &[String], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(DiosError::parse(
            path,
            lno,
            format!("Expected {n} argument(s) to '{op}': {args:?}"),
        ));
    }
    Ok(())
}

/// Strip the surrounding quotes a `"..."` lexeme carries straight out of
/// the tokenizer.
fn unquote(s: &str) -> String {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s).to_string()
}

/// Cross-entity checks that only make sense once the whole file has been
/// read: known phases, reserved phase names, and no event claimed at two
/// priorities within one phase (§3).
fn validate(program: &Program, path: &str) -> Result<()> {
    for phase in &program.phases {
        if BUILTIN_PHASES.contains(&phase.name.as_str()) {
            return Err(DiosError::parse(
                path,
                0,
                format!("Phase name '{}' is reserved for a built-in phase", phase.name),
            ));
        }
    }

    let known = program.known_phases();
    for queue in &program.queues {
        if !known.contains(&queue.phase) {
            return Err(DiosError::parse(
                path,
                0,
                format!(
                    "Unknown phase requested for evqueue {}: {:?}",
                    queue.name, queue.phase
                ),
            ));
        }
    }

    let mut all_phases: Vec<Option<String>> = vec![None];
    all_phases.extend(BUILTIN_PHASES.iter().map(|p| Some(p.to_string())));
    all_phases.extend(program.phases.iter().map(|p| Some(p.name.clone())));
    all_phases.extend(program.irqs.iter().map(|i| Some(i.phase.clone())));

    for phase in &all_phases {
        let mut seen: std::collections::HashMap<usize, &str> = std::collections::HashMap::new();
        for queue in &program.queues {
            if queue.phase != *phase {
                continue;
            }
            for &event_idx in &queue.events {
                if let Some(other) = seen.insert(event_idx, queue.name.as_str()) {
                    return Err(DiosError::parse(
                        path,
                        0,
                        format!(
                            "Both queue {} and {} in phase {:?} contain event {}",
                            other,
                            queue.name,
                            phase,
                            program.events.get(event_idx).name
                        ),
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(src: &str) -> Result<Program> {
        parse_lines(Cursor::new(src.as_bytes()), "-")
    }

    #[test]
    fn requires_dios_marker() {
        assert!(parse("").is_err());
        assert!(parse("\tinclude \"a.inc\"\n").is_err());
    }

    #[test]
    fn empty_program_parses() {
        let p = parse("\tdios\n").unwrap();
        assert_eq!(p.srcname, "-");
        assert!(p.includes.is_empty());
        assert!(p.queues.is_empty());
        assert!(!p.sleepable);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let p = parse(";\n; comment\n;; comment ;\n ; comment\n\n\tdios ; comment\n\t\n").unwrap();
        assert_eq!(p.srcname, "-");
    }

    #[test]
    fn includes_and_modules_are_unquoted_and_ordered() {
        let p = parse("\tdios\n\tinclude \"a.inc\"\n\tinclude\t\"b.inc\"\n").unwrap();
        assert_eq!(p.includes, vec!["a.inc", "b.inc"]);

        let p = parse("\tdios\n\tmodule \"a.inc\"\n\tmodule \"b.inc\"\n").unwrap();
        assert_eq!(p.modules.iter().map(|m| m.path.as_str()).collect::<Vec<_>>(), vec!["a.inc", "b.inc"]);
    }

    #[test]
    fn consts_map_reduction_keywords() {
        let p = parse(
            "\tdios\n\tconst a, and\n\tconst b, or\n\tconst c, xor\n\tconst d, add\n\tconst e, sub\n",
        )
        .unwrap();
        let reductions: Vec<_> = p.consts.iter().map(|c| c.reduction).collect();
        assert_eq!(
            reductions,
            vec![Reduction::And, Reduction::Or, Reduction::Xor, Reduction::Add, Reduction::Sub]
        );
    }

    #[test]
    fn queue_collects_events_in_order() {
        let p = parse("\tdios\n\tevqueue a\n\tevent b\n\tevent c\n").unwrap();
        assert_eq!(p.queues.len(), 1);
        assert_eq!(p.queues[0].name, "a");
        let names: Vec<_> =
            p.queues[0].events.iter().map(|&i| p.events.get(i).name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn event_without_queue_fails() {
        assert!(parse("\tdios\n\tevent a\n").is_err());
    }

    #[test]
    fn irq_requires_irq_prefix() {
        assert!(parse("\tdios\n\tirq bad_phase, F, B\n").is_err());
        let p = parse("\tdios\n\tirq irq_a, F, B\n").unwrap();
        assert_eq!(p.irqs[0].phase, "irq_a");
    }

    #[test]
    fn wake_always_and_explicit_sources_conflict() {
        assert!(parse("\tdios\n\twake f1, b1\n\twake always\n").is_err());
        assert!(parse("\tdios\n\twake always\n\twake f1, b1\n").is_err());
    }

    #[test]
    fn wake_marks_sleepable() {
        let p = parse("\tdios\n\twake f1, b1\n\twake f2, b2\n").unwrap();
        assert!(p.sleepable);
        assert_eq!(p.wakesrcs.len(), 2);

        let p = parse("\tdios\n\twake always\n").unwrap();
        assert!(p.sleepable);
        assert!(p.wakesrcs.is_empty());
    }

    #[test]
    fn duplicate_event_in_same_phase_is_rejected() {
        let src = "\tdios\n\tevqueue a, idle\n\tevent x\n\tevqueue b, idle\n\tevent x\n";
        assert!(parse(src).is_err());
    }

    #[test]
    fn same_event_in_different_phases_is_fine() {
        let src = "\tdios\n\tevqueue a, idle\n\tevent x\n\tevqueue b, init\n\tevent x\n";
        assert!(parse(src).is_ok());
    }

    #[test]
    fn unknown_phase_on_queue_is_rejected() {
        assert!(parse("\tdios\n\tevqueue a, nosuchphase\n").is_err());
    }

    #[test]
    fn user_phase_may_not_shadow_a_builtin_name() {
        assert!(parse("\tdios\n\tphase idle\n").is_err());
    }

    #[test]
    fn unknown_op_is_rejected() {
        assert!(parse("\tdios\n\tbogus x\n").is_err());
    }
}
