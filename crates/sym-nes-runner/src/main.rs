//! Headless symbolic ROM explorer.
//!
//! Loads an iNES image, seeds the scheduler with a root context, and
//! explores executions until the run queue drains under the cycle budget.
//! With `--solve-a`, each completed path is asked whether the accumulator
//! can reach the target value; the first satisfiable path's controller
//! assignment is printed as JSON.

use std::fs;
use std::process::ExitCode;

use log::info;
use sym_ast::{AstManager, SolverStatus};
use sym_nes::{Context, ContextScheduler};

/// Default per-context cycle budget.
const DEFAULT_MAX_CYCLES: u64 = 100_000;

struct Options {
    rom_path: String,
    max_cycles: u64,
    solve_a: Option<u8>,
}

fn usage() {
    eprintln!("Usage: sym-nes-runner [options] <rom.nes>");
    eprintln!("       --max-cycles <n>   per-context cycle budget (default {DEFAULT_MAX_CYCLES})");
    eprintln!("       --solve-a <hex>    solve for controller inputs reaching A == value");
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut rom_path = None;
    let mut max_cycles = DEFAULT_MAX_CYCLES;
    let mut solve_a = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--max-cycles" => {
                let value = iter.next().ok_or("--max-cycles needs a value")?;
                max_cycles = value
                    .parse()
                    .map_err(|_| format!("bad cycle count: {value}"))?;
            }
            "--solve-a" => {
                let value = iter.next().ok_or("--solve-a needs a value")?;
                let digits = value.trim_start_matches("0x").trim_start_matches('$');
                solve_a = Some(
                    u8::from_str_radix(digits, 16)
                        .map_err(|_| format!("bad target value: {value}"))?,
                );
            }
            other if other.starts_with('-') => return Err(format!("unknown option: {other}")),
            other => rom_path = Some(other.to_string()),
        }
    }

    Ok(Options {
        rom_path: rom_path.ok_or("no ROM given")?,
        max_cycles,
        solve_a,
    })
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            usage();
            return ExitCode::FAILURE;
        }
    };

    match run(&options) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("{}: {message}", options.rom_path);
            ExitCode::FAILURE
        }
    }
}

fn run(options: &Options) -> Result<ExitCode, String> {
    let data = fs::read(&options.rom_path).map_err(|e| format!("failed to read: {e}"))?;

    let mut m = AstManager::new();
    let mut root = Context::new(&mut m);
    root.load_ines(&mut m, &data).map_err(|e| e.to_string())?;

    let mut scheduler = ContextScheduler::new();
    scheduler.set_maximum_cpu_cycles(options.max_cycles);
    scheduler.add_context(root);

    while scheduler.have_contexts() {
        scheduler
            .run_next_context(&mut m)
            .map_err(|e| e.to_string())?;
    }

    let completed = scheduler.take_completed();
    info!("{} context(s) explored", completed.len());

    for (index, ctx) in completed.iter().enumerate() {
        let pc = match m.value(ctx.cpu_pc()) {
            Some(pc) => format!("${pc:04X}"),
            None => "symbolic".to_string(),
        };
        println!(
            "context {index}: {} cycles, PC {pc}, {} constraint(s), {} input(s){}",
            ctx.cpu_cycle_count(),
            ctx.path_constraints().len(),
            ctx.inputs().len(),
            if ctx.has_forked() { ", forked" } else { "" },
        );
    }

    let Some(target) = options.solve_a else {
        return Ok(ExitCode::SUCCESS);
    };

    // Ask each completed path whether A can reach the target; report the
    // first input assignment that does.
    let target_term = m.byte(target);
    for (index, ctx) in completed.iter().enumerate() {
        if ctx.has_forked() {
            // A forked parent's machine state was superseded by its children.
            continue;
        }
        let goal = m
            .eq(ctx.cpu_a(), target_term)
            .map_err(|e| e.to_string())?;
        let mut assertions = ctx.path_constraints().to_vec();
        assertions.push(goal);

        let (status, model) = m.call_solver(&assertions).map_err(|e| e.to_string())?;
        info!("context {index}: solver says {status:?}");

        if status == SolverStatus::Sat {
            if let Some(model) = model {
                let report = serde_json::json!({
                    "context": index,
                    "target_a": format!("{target:#04x}"),
                    "model": model,
                });
                println!("{report}");
                return Ok(ExitCode::SUCCESS);
            }
        }
    }

    eprintln!("no completed path reaches A == {target:#04x}");
    Ok(ExitCode::FAILURE)
}
